//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - Ed25519 key pair generation, signing, and verification
//! - SHA-256 hashing rendered as lowercase hex
//! - The block digest and the canonical signing message

use crate::types::Block;
use crate::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Versioned prefix of the signing message
pub const SIGNING_DOMAIN: &str = "AURUM|v1";

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from a hex-encoded 32 byte seed
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| Error::Config(format!("Signing seed is not hex: {}", e)))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::Config(format!("Signing seed must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Public key as lowercase hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// Sign a message, returning the 64 byte detached signature
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Sign `block`'s identity string and record signature and signer key
    pub fn sign_block(&self, block: &mut Block) {
        let signature = self.sign(block.signing_message().as_bytes());
        block.signature = hex::encode(signature);
        block.signer_key = self.public_key_hex();
    }
}

/// Verify a detached signature with a public key
pub fn verify_signature(message: &[u8], signature: &[u8; 64], public_key: &[u8; 32]) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key
        .verify(message, &Signature::from_bytes(signature))
        .is_ok()
}

/// Verify a block's signature against its recorded signer key
pub fn verify_block_signature(block: &Block) -> Result<()> {
    let public_key: [u8; 32] = decode_fixed(&block.signer_key, "signer key")?;
    let signature: [u8; 64] = decode_fixed(&block.signature, "signature")?;

    if verify_signature(block.signing_message().as_bytes(), &signature, &public_key) {
        Ok(())
    } else {
        Err(Error::SignatureError(format!(
            "Block {} signature does not match signer {}",
            block.height, block.signer_key
        )))
    }
}

fn decode_fixed<const N: usize>(value: &str, what: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value)
        .map_err(|e| Error::SignatureError(format!("Invalid {} hex: {}", what, e)))?;
    bytes.as_slice().try_into().map_err(|_| {
        Error::SignatureError(format!("Invalid {} length: {} bytes", what, bytes.len()))
    })
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of `data` as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(hash_bytes(data))
}

/// Block digest
///
/// `sha256(height ++ created_at ++ previous_digest ++ merkle_root)` over the
/// decimal and hex renderings, without separators. Signature and signer are
/// not covered.
pub fn block_digest(
    height: u64,
    created_at: i64,
    previous_digest: &str,
    merkle_root: &str,
) -> String {
    let data = format!("{}{}{}{}", height, created_at, previous_digest, merkle_root);
    sha256_hex(data.as_bytes())
}

/// Canonical block identity string: `AURUM|v1|<height>|<previous>|<merkle>`
pub fn signing_message(height: u64, previous_digest: &str, merkle_root: &str) -> String {
    format!(
        "{}|{}|{}|{}",
        SIGNING_DOMAIN, height, previous_digest, merkle_root
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GENESIS_PREVIOUS_DIGEST;

    fn unsigned_block() -> Block {
        Block {
            height: 3,
            created_at: 1_700_000_000,
            previous_digest: GENESIS_PREVIOUS_DIGEST.to_string(),
            merkle_root: sha256_hex(b"root"),
            transactions: vec![],
            digest: String::new(),
            signature: String::new(),
            signer_key: String::new(),
            sealed: true,
        }
    }

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let keypair1 = KeyPair::from_seed(&seed);
        let keypair2 = KeyPair::from_seed(&seed);

        // Same seed should produce same keys
        assert_eq!(keypair1.public_key(), keypair2.public_key());
    }

    #[test]
    fn test_keypair_from_hex_seed() {
        let keypair = KeyPair::from_hex_seed(&hex::encode([7u8; 32])).unwrap();
        assert_eq!(keypair.public_key(), KeyPair::from_seed(&[7u8; 32]).public_key());

        assert!(KeyPair::from_hex_seed("zz").is_err());
        assert!(KeyPair::from_hex_seed(&hex::encode([7u8; 16])).is_err());
    }

    #[test]
    fn test_verify_signature() {
        let keypair = KeyPair::generate();
        let message = b"test message";
        let signature = keypair.sign(message);

        assert!(verify_signature(message, &signature, &keypair.public_key()));
        assert!(!verify_signature(b"wrong message", &signature, &keypair.public_key()));

        // Wrong public key should fail
        let wrong_keypair = KeyPair::generate();
        assert!(!verify_signature(message, &signature, &wrong_keypair.public_key()));
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_block_digest_concatenates_fields() {
        let digest = block_digest(1, 1_700_000_000, "aa", "bb");
        assert_eq!(digest, sha256_hex(b"11700000000aabb"));
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_signing_message_format() {
        assert_eq!(signing_message(12, "prev", "root"), "AURUM|v1|12|prev|root");
    }

    #[test]
    fn test_sign_block_and_verify() {
        let keypair = KeyPair::from_seed(&[9u8; 32]);
        let mut block = unsigned_block();
        keypair.sign_block(&mut block);

        assert_eq!(block.signature.len(), 128);
        assert_eq!(block.signer_key, keypair.public_key_hex());
        assert!(verify_block_signature(&block).is_ok());
    }

    #[test]
    fn test_signature_independent_of_digest() {
        let keypair = KeyPair::from_seed(&[9u8; 32]);
        let mut block = unsigned_block();
        keypair.sign_block(&mut block);

        // The digest is not part of the signed message
        block.digest = "tampered".to_string();
        assert!(verify_block_signature(&block).is_ok());

        // The merkle root is
        block.merkle_root = sha256_hex(b"other root");
        assert!(matches!(
            verify_block_signature(&block),
            Err(Error::SignatureError(_))
        ));
    }

    #[test]
    fn test_known_signature_vector() {
        // RFC 8032 test vector 1
        let seed = [
            0x9d, 0x61, 0xb1, 0x9d, 0xef, 0xfd, 0x5a, 0x60,
            0xba, 0x84, 0x4a, 0xf4, 0x92, 0xec, 0x2c, 0xc4,
            0x44, 0x49, 0xc5, 0x69, 0x7b, 0x32, 0x69, 0x19,
            0x70, 0x3b, 0xac, 0x03, 0x1c, 0xae, 0x7f, 0x60,
        ];

        let keypair = KeyPair::from_seed(&seed);
        assert_eq!(
            keypair.public_key_hex(),
            "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
        );

        let signature = keypair.sign(b"");
        assert!(verify_signature(b"", &signature, &keypair.public_key()));
    }
}
