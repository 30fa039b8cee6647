//! Ledger node binary
//!
//! Opens the ledger, audits it and keeps the anchor actor alive until Ctrl-C.
//! Price aggregation and the HTTP surface run in separate services.

use anyhow::Context;
use aurum_ledger::{
    anchor::{spawn_anchor_actor, LogAnchorSink},
    crypto::KeyPair,
    Config, Ledger,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Aurum ledger node");

    // Load configuration
    let config = match std::env::var("AURUM_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => Config::from_env().context("reading configuration from environment")?,
    };

    let keypair = match std::env::var("AURUM_SIGNING_SEED") {
        Ok(seed) => KeyPair::from_hex_seed(&seed).context("parsing AURUM_SIGNING_SEED")?,
        Err(_) => {
            tracing::warn!("AURUM_SIGNING_SEED not set, using an ephemeral signing key");
            KeyPair::generate()
        }
    };

    // Open ledger
    let mut ledger = Ledger::open(&config, keypair)
        .with_context(|| format!("opening ledger at {}", config.ledger_path.display()))?;

    let anchor = if config.anchor.enabled {
        let handle = spawn_anchor_actor(LogAnchorSink::new(&config.anchor), &config.anchor);
        ledger = ledger.with_anchor(handle.clone());
        Some(handle)
    } else {
        None
    };

    match ledger.verify_chain() {
        Ok(()) => tracing::info!("Ledger audit passed"),
        Err(e) => tracing::error!(error = %e, "Ledger audit failed"),
    }

    let summary = ledger.summary();
    tracing::info!(
        height = summary.height,
        latest_digest = summary.latest_digest.as_deref().unwrap_or("-"),
        status = %summary.status,
        signer = %ledger.public_key_hex(),
        "Ledger ready"
    );

    tokio::signal::ctrl_c().await?;

    if let Some(anchor) = anchor {
        anchor.flush().await?;
        anchor.shutdown().await?;
    }

    tracing::info!("Shutting down ledger node");
    Ok(())
}
