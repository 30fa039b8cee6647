//! Main ledger orchestration layer
//!
//! This module ties together storage, crypto and the in-memory chain into
//! one engine value. There is exactly one writer section: `append` holds the
//! chain's write lock from reading the tail until the block is both durable
//! and indexed, so readers see either the chain before or after an append,
//! never anything in between.
//!
//! # Example
//!
//! ```no_run
//! use aurum_ledger::{crypto::KeyPair, Config, Ledger};
//! use serde_json::json;
//!
//! fn main() -> aurum_ledger::Result<()> {
//!     let ledger = Ledger::open(&Config::default(), KeyPair::generate())?;
//!
//!     let block = ledger.append_record(&json!({"asset": "XAU/USD", "price": 2650.5}))?;
//!     assert_eq!(ledger.latest().map(|b| b.height), Some(block.height));
//!
//!     Ok(())
//! }
//! ```

use crate::{
    anchor::AnchorHandle,
    crypto::KeyPair,
    merkle::merkle_root,
    metrics::Metrics,
    storage::Storage,
    types::{
        payload_from, Block, ChainStatus, ChainSummary, Payload, Transaction,
        GENESIS_PREVIOUS_DIGEST,
    },
    verify, Config, Result,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::time::Instant;

/// Main ledger interface
pub struct Ledger {
    /// Committed blocks, index == height
    blocks: RwLock<Vec<Block>>,

    /// Ledger file
    storage: Storage,

    /// Node signing key
    keypair: KeyPair,

    /// Optional anchoring side channel
    anchor: Option<AnchorHandle>,

    /// Prometheus collectors
    metrics: Metrics,
}

impl Ledger {
    /// Open the ledger file and rebuild the in-memory chain from it
    pub fn open(config: &Config, keypair: KeyPair) -> Result<Self> {
        let storage = Storage::open(&config.ledger_path, config.storage.sync_writes)?;
        let report = storage.load()?;

        if report.has_partial_tail() {
            tracing::warn!(
                path = ?storage.path(),
                kept_blocks = report.blocks.len(),
                discarded_bytes = report.discarded_bytes,
                "Partial trailing record dropped"
            );
            storage.truncate(report.valid_bytes)?;
        }

        if config.storage.verify_on_load {
            verify::verify_chain(&report.blocks)?;
            tracing::info!(blocks = report.blocks.len(), "Ledger history verified");
        }

        let metrics = Metrics::new()?;
        metrics.record_loaded(report.blocks.len(), report.valid_bytes);

        tracing::info!(
            path = ?storage.path(),
            blocks = report.blocks.len(),
            signer = %keypair.public_key_hex(),
            "Ledger opened"
        );

        Ok(Self {
            blocks: RwLock::new(report.blocks),
            storage,
            keypair,
            anchor: None,
            metrics,
        })
    }

    /// Attach an anchoring handle; due blocks are forwarded after each append
    pub fn with_anchor(mut self, anchor: AnchorHandle) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Append one observation as a new block
    ///
    /// The block is durable on disk before it becomes visible in memory. If
    /// the write or sync fails, the file is cut back to its previous length
    /// and the error is returned with the chain unchanged.
    pub fn append(&self, payload: Payload) -> Result<Block> {
        let started = Instant::now();
        let mut blocks = self.blocks.write();

        let (height, previous_digest) = match blocks.last() {
            Some(tail) => (tail.height + 1, tail.digest.clone()),
            None => (0, GENESIS_PREVIOUS_DIGEST.to_string()),
        };

        let block = match self.seal_block(height, previous_digest, payload) {
            Ok(block) => block,
            Err(e) => {
                self.metrics.record_append_failure();
                return Err(e);
            }
        };

        let written = match self.storage.append(&block) {
            Ok(written) => written,
            Err(e) => {
                self.metrics.record_append_failure();
                tracing::error!(height, error = %e, "Failed to persist block, append aborted");
                return Err(e);
            }
        };

        blocks.push(block.clone());
        // Gauges are set under the lock so concurrent appends apply them in height order
        self.metrics
            .record_block_appended(height, written, started.elapsed().as_secs_f64());
        drop(blocks);

        tracing::debug!(height, digest = %block.digest, "Block committed");

        if let Some(anchor) = &self.anchor {
            anchor.notify(&block);
        }

        Ok(block)
    }

    /// Serialize `record` into a payload and append it
    pub fn append_record<T: Serialize + ?Sized>(&self, record: &T) -> Result<Block> {
        self.append(payload_from(record)?)
    }

    /// Build the transaction and the signed block shell at `height`
    fn seal_block(&self, height: u64, previous_digest: String, payload: Payload) -> Result<Block> {
        let now = Utc::now().timestamp();
        let transaction = Transaction::new(payload, now)?;

        let mut block = Block {
            height,
            created_at: now,
            previous_digest,
            merkle_root: merkle_root(&[transaction.digest.clone()]),
            transactions: vec![transaction],
            digest: String::new(),
            signature: String::new(),
            signer_key: String::new(),
            sealed: true,
        };

        block.digest = block.compute_digest();
        self.keypair.sign_block(&mut block);

        Ok(block)
    }

    /// Tail block, or `None` for an empty chain
    pub fn latest(&self) -> Option<Block> {
        self.blocks.read().last().cloned()
    }

    /// Height, tail digest and status in one consistent read
    pub fn summary(&self) -> ChainSummary {
        let blocks = self.blocks.read();
        match blocks.last() {
            Some(tail) => ChainSummary {
                height: blocks.len() as u64,
                latest_digest: Some(tail.digest.clone()),
                status: ChainStatus::Secure,
            },
            None => ChainSummary::empty(),
        }
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// Whether no block exists yet
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Block at `height`
    pub fn get_block(&self, height: u64) -> Option<Block> {
        let index = usize::try_from(height).ok()?;
        self.blocks.read().get(index).cloned()
    }

    /// Blocks with heights in `range`, clamped to the chain
    pub fn blocks(&self, range: Range<u64>) -> Vec<Block> {
        let blocks = self.blocks.read();
        let end = (range.end.min(blocks.len() as u64)) as usize;
        let start = (range.start.min(end as u64)) as usize;
        blocks[start..end].to_vec()
    }

    /// Newest block created at or before `timestamp` (seconds since epoch)
    pub fn block_at_or_before(&self, timestamp: i64) -> Option<Block> {
        self.blocks
            .read()
            .iter()
            .rev()
            .find(|block| block.created_at <= timestamp)
            .cloned()
    }

    /// Verify digests, signatures and linkage of the whole chain
    pub fn verify_chain(&self) -> Result<()> {
        verify::verify_chain(&self.blocks.read())
    }

    /// Signer public key (hex)
    pub fn public_key_hex(&self) -> String {
        self.keypair.public_key_hex()
    }

    /// Ledger file path
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Metrics collectors
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.storage.path())
            .field("blocks", &self.len())
            .field("anchor", &self.anchor.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    fn create_test_ledger(dir: &tempfile::TempDir) -> Ledger {
        let mut config = Config::default();
        config.ledger_path = dir.path().join("ledger.dat");
        config.storage.sync_writes = false;

        Ledger::open(&config, KeyPair::from_seed(&[1u8; 32])).unwrap()
    }

    #[test]
    fn test_empty_ledger_queries() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir);

        assert!(ledger.is_empty());
        assert!(ledger.latest().is_none());
        assert_eq!(ledger.summary(), ChainSummary::empty());
        assert!(ledger.get_block(0).is_none());
        assert!(ledger.blocks(0..10).is_empty());
        assert!(ledger.block_at_or_before(i64::MAX).is_none());
    }

    #[test]
    fn test_append_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir);

        let block = ledger.append_record(&json!({"price": 100})).unwrap();
        assert_eq!(block.height, 0);
        assert_eq!(block.previous_digest, GENESIS_PREVIOUS_DIGEST);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.merkle_root, block.transactions[0].digest);
        assert_eq!(block.digest, block.compute_digest());
        assert_eq!(block.signer_key, ledger.public_key_hex());
        assert!(block.sealed);

        assert_eq!(ledger.latest(), Some(block.clone()));
        assert_eq!(ledger.get_block(0), Some(block));
    }

    #[test]
    fn test_blocks_range_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir);
        for price in 0..4 {
            ledger.append_record(&json!({ "price": price })).unwrap();
        }

        let heights: Vec<u64> = ledger.blocks(1..10).iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![1, 2, 3]);
        assert!(ledger.blocks(7..9).is_empty());
    }

    #[test]
    fn test_block_at_or_before() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir);
        let block = ledger.append_record(&json!({"price": 1})).unwrap();

        assert_eq!(ledger.block_at_or_before(block.created_at), Some(block.clone()));
        assert!(ledger.block_at_or_before(block.created_at - 1).is_none());
    }

    #[test]
    fn test_malformed_payload_leaves_chain_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir);

        let err = ledger.append_record(&"not an object").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
        assert!(ledger.is_empty());
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_metrics_track_appends() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir);
        ledger.append_record(&json!({"price": 1})).unwrap();
        ledger.append_record(&json!({"price": 2})).unwrap();

        assert_eq!(ledger.metrics().blocks_appended.get(), 2);
        assert_eq!(ledger.metrics().chain_height.get(), 2);
        assert_eq!(
            ledger.metrics().ledger_bytes.get() as u64,
            std::fs::metadata(ledger.path()).unwrap().len()
        );
    }

    #[test]
    fn test_verify_chain_after_appends() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = create_test_ledger(&dir);
        for price in [100, 101, 99] {
            ledger.append_record(&json!({ "price": price })).unwrap();
        }

        assert!(ledger.verify_chain().is_ok());
    }
}
