//! Core types for the ledger
//!
//! Field names on the wire follow the existing ledger files, so the serde
//! renames below are part of the persisted format.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Previous digest carried by the block at height 0.
pub const GENESIS_PREVIOUS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Opaque observation payload.
///
/// Keys are kept in sorted order, which makes the JSON rendering canonical.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Convert any serializable record into a payload.
///
/// The record must serialize to a JSON object.
pub fn payload_from<T: Serialize + ?Sized>(record: &T) -> crate::Result<Payload> {
    let value = serde_json::to_value(record)
        .map_err(|e| crate::Error::MalformedPayload(e.to_string()))?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(crate::Error::MalformedPayload(format!(
            "payload must be an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Canonical bytes of a payload (compact JSON, sorted keys)
pub fn canonical_payload_bytes(payload: &Payload) -> crate::Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| crate::Error::MalformedPayload(e.to_string()))
}

/// Older writers render an absent map or list as `null`
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One payload unit carried by a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// SHA-256 of the canonical payload bytes (hex)
    #[serde(rename = "tx_hash")]
    pub digest: String,

    /// Seconds since Unix epoch
    #[serde(rename = "timestamp")]
    pub observed_at: i64,

    /// Observation data, opaque to the ledger
    #[serde(rename = "data", default, deserialize_with = "null_as_default")]
    pub payload: Payload,
}

impl Transaction {
    /// Build a transaction, hashing the canonical form of `payload`
    pub fn new(payload: Payload, observed_at: i64) -> crate::Result<Self> {
        let digest = crate::crypto::sha256_hex(&canonical_payload_bytes(&payload)?);
        Ok(Self {
            digest,
            observed_at,
            payload,
        })
    }

    /// Recompute the digest from the payload
    pub fn compute_digest(&self) -> crate::Result<String> {
        Ok(crate::crypto::sha256_hex(&canonical_payload_bytes(
            &self.payload,
        )?))
    }
}

/// Committed ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, starting at 0
    #[serde(rename = "index")]
    pub height: u64,

    /// Seconds since Unix epoch
    #[serde(rename = "timestamp")]
    pub created_at: i64,

    /// Digest of the preceding block, or [`GENESIS_PREVIOUS_DIGEST`]
    #[serde(rename = "previous_hash")]
    pub previous_digest: String,

    /// Commitment over the transaction digests
    pub merkle_root: String,

    /// Carried transactions (one per block in practice)
    #[serde(default, deserialize_with = "null_as_default")]
    pub transactions: Vec<Transaction>,

    /// Content hash of (height, created_at, previous_digest, merkle_root)
    #[serde(rename = "hash")]
    pub digest: String,

    /// Ed25519 signature over [`Block::signing_message`] (hex)
    pub signature: String,

    /// Ed25519 public key of the signer (hex)
    #[serde(rename = "signer_pubkey")]
    pub signer_key: String,

    /// Always true once persisted
    #[serde(rename = "locked")]
    pub sealed: bool,
}

impl Block {
    /// Recompute the block digest from its four defining fields
    pub fn compute_digest(&self) -> String {
        crate::crypto::block_digest(
            self.height,
            self.created_at,
            &self.previous_digest,
            &self.merkle_root,
        )
    }

    /// Canonical identity string covered by the signature
    pub fn signing_message(&self) -> String {
        crate::crypto::signing_message(self.height, &self.previous_digest, &self.merkle_root)
    }

    /// Transaction digests in block order
    pub fn transaction_digests(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.digest.clone()).collect()
    }

    /// Whether this block is the first of the chain
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block #{} ({})", self.height, self.digest)
    }
}

/// Chain health as reported by [`ChainSummary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    /// No block has been appended yet
    Empty,
    /// At least one block exists
    Secure,
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainStatus::Empty => write!(f, "empty"),
            ChainStatus::Secure => write!(f, "secure"),
        }
    }
}

/// Read-only snapshot of the chain tip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    /// Number of blocks in the chain
    pub height: u64,

    /// Digest of the tail block, if any
    #[serde(rename = "latest_hash")]
    pub latest_digest: Option<String>,

    /// Chain status
    #[serde(rename = "integrity")]
    pub status: ChainStatus,
}

impl ChainSummary {
    /// Summary of a chain with no blocks
    pub fn empty() -> Self {
        Self {
            height: 0,
            latest_digest: None,
            status: ChainStatus::Empty,
        }
    }
}
