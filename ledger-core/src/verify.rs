//! Integrity checks over committed blocks
//!
//! Authenticity (signature) and linkage (digests) are independent: the
//! signature covers `AURUM|v1|height|previous|merkle`, the digest covers
//! `height ++ created_at ++ previous ++ merkle`.

use crate::crypto::verify_block_signature;
use crate::merkle::merkle_root;
use crate::types::{Block, GENESIS_PREVIOUS_DIGEST};
use crate::{Error, Result};

/// Recompute transaction digests, merkle root and block digest, then check the signature
pub fn verify_block(block: &Block) -> Result<()> {
    for (i, tx) in block.transactions.iter().enumerate() {
        let digest = tx.compute_digest()?;
        if digest != tx.digest {
            return Err(Error::IntegrityViolation(format!(
                "Block {} transaction {} digest mismatch: stored {}, computed {}",
                block.height, i, tx.digest, digest
            )));
        }
    }

    let root = merkle_root(&block.transaction_digests());
    if root != block.merkle_root {
        return Err(Error::IntegrityViolation(format!(
            "Block {} merkle root mismatch: stored {}, computed {}",
            block.height, block.merkle_root, root
        )));
    }

    let digest = block.compute_digest();
    if digest != block.digest {
        return Err(Error::IntegrityViolation(format!(
            "Block {} digest mismatch: stored {}, computed {}",
            block.height, block.digest, digest
        )));
    }

    if !block.sealed {
        return Err(Error::IntegrityViolation(format!(
            "Block {} is not sealed",
            block.height
        )));
    }

    verify_block_signature(block)
}

/// Check that `block` directly follows `previous` (or is genesis when `None`)
pub fn verify_linkage(previous: Option<&Block>, block: &Block) -> Result<()> {
    let (expected_height, expected_previous) = match previous {
        Some(prev) => (prev.height + 1, prev.digest.as_str()),
        None => (0, GENESIS_PREVIOUS_DIGEST),
    };

    if block.height != expected_height {
        return Err(Error::IntegrityViolation(format!(
            "Expected height {}, found {}",
            expected_height, block.height
        )));
    }

    if block.previous_digest != expected_previous {
        return Err(Error::IntegrityViolation(format!(
            "Block {} previous digest {} does not match {}",
            block.height, block.previous_digest, expected_previous
        )));
    }

    Ok(())
}

/// Verify every block and every link of a chain
pub fn verify_chain(blocks: &[Block]) -> Result<()> {
    let mut previous = None;
    for block in blocks {
        verify_linkage(previous, block)?;
        verify_block(block)?;
        previous = Some(block);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::Transaction;
    use serde_json::json;

    fn chain(len: u64) -> Vec<Block> {
        let keypair = KeyPair::from_seed(&[3u8; 32]);
        let mut blocks: Vec<Block> = Vec::new();

        for height in 0..len {
            let payload = match json!({"price": 2000 + height, "sources": 3}) {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            };
            let tx = Transaction::new(payload, 1_700_000_000).unwrap();
            let mut block = Block {
                height,
                created_at: 1_700_000_000 + height as i64 * 60,
                previous_digest: blocks
                    .last()
                    .map(|b| b.digest.clone())
                    .unwrap_or_else(|| GENESIS_PREVIOUS_DIGEST.to_string()),
                merkle_root: merkle_root(&[tx.digest.clone()]),
                transactions: vec![tx],
                digest: String::new(),
                signature: String::new(),
                signer_key: String::new(),
                sealed: true,
            };
            block.digest = block.compute_digest();
            keypair.sign_block(&mut block);
            blocks.push(block);
        }

        blocks
    }

    #[test]
    fn test_valid_chain() {
        assert!(verify_chain(&chain(4)).is_ok());
        assert!(verify_chain(&[]).is_ok());
    }

    #[test]
    fn test_tampered_payload_detected() {
        let mut blocks = chain(3);
        blocks[1].transactions[0]
            .payload
            .insert("price".to_string(), json!(1));

        let err = verify_chain(&blocks).unwrap_err();
        assert!(err.to_string().contains("transaction 0 digest mismatch"));
    }

    #[test]
    fn test_tampered_timestamp_detected() {
        let mut blocks = chain(2);
        blocks[0].created_at += 1;

        let err = verify_block(&blocks[0]).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[test]
    fn test_broken_link_detected() {
        let mut blocks = chain(3);
        blocks.remove(1);

        assert!(matches!(
            verify_chain(&blocks),
            Err(Error::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_foreign_signature_detected() {
        let mut blocks = chain(1);
        blocks[0].signer_key = KeyPair::from_seed(&[4u8; 32]).public_key_hex();

        assert!(matches!(
            verify_block(&blocks[0]),
            Err(Error::SignatureError(_))
        ));
    }

    #[test]
    fn test_genesis_must_use_sentinel() {
        let mut blocks = chain(1);
        blocks[0].previous_digest = "ff".repeat(32);

        assert!(verify_linkage(None, &blocks[0]).is_err());
    }
}
