//! Metrics collection for observability
//!
//! Each ledger owns its own Prometheus registry.
//!
//! # Metrics
//!
//! - `aurum_blocks_appended_total` - Blocks committed by this process
//! - `aurum_append_failures_total` - Appends aborted before commit
//! - `aurum_append_duration_seconds` - Histogram of append latencies
//! - `aurum_chain_height` - Number of blocks in the chain
//! - `aurum_ledger_file_bytes` - Ledger file size

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::fmt;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total blocks appended
    pub blocks_appended: IntCounter,

    /// Total failed appends
    pub append_failures: IntCounter,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Chain height (block count)
    pub chain_height: IntGauge,

    /// Ledger file size
    pub ledger_bytes: IntGauge,

    registry: Registry,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let blocks_appended = IntCounter::new(
            "aurum_blocks_appended_total",
            "Total number of blocks appended",
        )?;
        registry.register(Box::new(blocks_appended.clone()))?;

        let append_failures = IntCounter::new(
            "aurum_append_failures_total",
            "Total number of appends aborted before commit",
        )?;
        registry.register(Box::new(append_failures.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "aurum_append_duration_seconds",
                "Histogram of append latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let chain_height = IntGauge::new("aurum_chain_height", "Number of blocks in the chain")?;
        registry.register(Box::new(chain_height.clone()))?;

        let ledger_bytes = IntGauge::new("aurum_ledger_file_bytes", "Ledger file size in bytes")?;
        registry.register(Box::new(ledger_bytes.clone()))?;

        Ok(Self {
            blocks_appended,
            append_failures,
            append_duration,
            chain_height,
            ledger_bytes,
            registry,
        })
    }

    /// Record a committed block
    pub fn record_block_appended(&self, height: u64, record_bytes: u64, duration_seconds: f64) {
        self.blocks_appended.inc();
        self.chain_height.set((height + 1) as i64);
        self.ledger_bytes.add(record_bytes as i64);
        self.append_duration.observe(duration_seconds);
    }

    /// Record an aborted append
    pub fn record_append_failure(&self) {
        self.append_failures.inc();
    }

    /// Reset gauges after loading the ledger file
    pub fn record_loaded(&self, block_count: usize, file_bytes: u64) {
        self.chain_height.set(block_count as i64);
        self.ledger_bytes.set(file_bytes as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("blocks_appended", &self.blocks_appended.get())
            .field("append_failures", &self.append_failures.get())
            .field("chain_height", &self.chain_height.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.blocks_appended.get(), 0);
        assert_eq!(metrics.registry().gather().len(), 5);

        // Independent registries: a second collector does not collide
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_block_appended() {
        let metrics = Metrics::new().unwrap();
        metrics.record_loaded(4, 1000);
        metrics.record_block_appended(4, 250, 0.002);

        assert_eq!(metrics.blocks_appended.get(), 1);
        assert_eq!(metrics.chain_height.get(), 5);
        assert_eq!(metrics.ledger_bytes.get(), 1250);
    }

    #[test]
    fn test_record_append_failure() {
        let metrics = Metrics::new().unwrap();
        metrics.record_append_failure();
        assert_eq!(metrics.append_failures.get(), 1);
        assert_eq!(metrics.chain_height.get(), 0);
    }
}
