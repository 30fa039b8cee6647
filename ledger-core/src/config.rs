//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the append-only ledger file
    pub ledger_path: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger file configuration
    pub storage: StorageConfig,

    /// External-chain anchoring configuration
    pub anchor: AnchorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("./data/aurum_ledger.dat"),
            service_name: "aurum-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            storage: StorageConfig::default(),
            anchor: AnchorConfig::default(),
        }
    }
}

/// Ledger file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// fsync every record before the append is acknowledged
    pub sync_writes: bool,

    /// Re-check digests, signatures and linkage when loading history.
    /// Off by default: history is trusted on load.
    pub verify_on_load: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sync_writes: true,
            verify_on_load: false,
        }
    }
}

/// Anchoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Enable anchoring
    pub enabled: bool,

    /// Target chain identifier
    pub chain_id: String,

    /// Target chain RPC endpoint
    pub rpc_endpoint: String,

    /// Anchor every N blocks (heights divisible by N)
    pub interval_blocks: u64,

    /// Bounded mailbox size; requests beyond it are dropped
    pub mailbox_capacity: usize,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chain_id: "aurum-anchor-1".to_string(),
            rpc_endpoint: "http://127.0.0.1:1317".to_string(),
            interval_blocks: 5,
            mailbox_capacity: 64,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("AURUM_LEDGER_PATH") {
            config.ledger_path = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("AURUM_SYNC_WRITES") {
            config.storage.sync_writes = parse_bool("AURUM_SYNC_WRITES", &value)?;
        }

        if let Ok(value) = std::env::var("AURUM_VERIFY_ON_LOAD") {
            config.storage.verify_on_load = parse_bool("AURUM_VERIFY_ON_LOAD", &value)?;
        }

        if let Ok(value) = std::env::var("AURUM_ANCHOR_ENABLED") {
            config.anchor.enabled = parse_bool("AURUM_ANCHOR_ENABLED", &value)?;
        }

        if let Ok(chain_id) = std::env::var("AURUM_ANCHOR_CHAIN_ID") {
            config.anchor.chain_id = chain_id;
        }

        if let Ok(endpoint) = std::env::var("AURUM_ANCHOR_RPC") {
            config.anchor.rpc_endpoint = endpoint;
        }

        Ok(config)
    }
}

fn parse_bool(name: &str, value: &str) -> crate::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(crate::Error::Config(format!(
            "{} must be a boolean, got {:?}",
            name, other
        ))),
    }
}
