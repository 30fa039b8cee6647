//! Aurum Ledger Core
//!
//! Append-only, signed hash chain of commodity-price observations.
//!
//! # Architecture
//!
//! - **Single Writer**: one exclusive section per append (read tail, seal, persist, index)
//! - **Hash Chain**: every block commits to its predecessor's digest
//! - **Merkle Commitment**: odd-carry reduction over transaction digests
//! - **Detached Signatures**: Ed25519 over a versioned block identity string
//! - **Length-Prefixed File**: sequential reload, partial tail discarded
//!
//! # Invariants
//!
//! - Linkage: `blocks[i].previous_digest == blocks[i - 1].digest`
//! - Height: `blocks[i].height == i`
//! - Durability first: a block is on disk before it is visible in memory
//! - Append-only: blocks are never modified or removed

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod anchor;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod merkle;
pub mod metrics;
pub mod storage;
pub mod types;
pub mod verify;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use types::{
    Block, ChainStatus, ChainSummary, Payload, Transaction, GENESIS_PREVIOUS_DIGEST,
};
