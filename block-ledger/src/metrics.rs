//! Metrics collection for observability
//!
//! Each ledger owns its own Prometheus registry so that independent ledgers
//! (tests, multiple script sessions) never collide on metric names.
//!
//! # Metrics
//!
//! - `ledger_transactions_received_total` - Transactions appended to an open block
//! - `ledger_transactions_rejected_total` - Transactions dropped during batch validation
//! - `ledger_blocks_committed_total` - Committed blocks
//! - `ledger_chain_height` - Number of the last committed block
//! - `ledger_batch_rejections` - Histogram of rejections per failed batch

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions appended to an open block
    pub transactions_received: IntCounter,

    /// Transactions dropped during batch validation
    pub transactions_rejected: IntCounter,

    /// Committed blocks
    pub blocks_committed: IntCounter,

    /// Last committed block number
    pub chain_height: IntGauge,

    /// Rejections per failed batch
    pub batch_rejections: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_received = IntCounter::new(
            "ledger_transactions_received_total",
            "Transactions appended to an open block",
        )?;
        registry.register(Box::new(transactions_received.clone()))?;

        let transactions_rejected = IntCounter::new(
            "ledger_transactions_rejected_total",
            "Transactions dropped during batch validation",
        )?;
        registry.register(Box::new(transactions_rejected.clone()))?;

        let blocks_committed =
            IntCounter::new("ledger_blocks_committed_total", "Committed blocks")?;
        registry.register(Box::new(blocks_committed.clone()))?;

        let chain_height = IntGauge::new("ledger_chain_height", "Last committed block number")?;
        registry.register(Box::new(chain_height.clone()))?;

        let batch_rejections = Histogram::with_opts(
            HistogramOpts::new("ledger_batch_rejections", "Rejections per failed batch")
                .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0]),
        )?;
        registry.register(Box::new(batch_rejections.clone()))?;

        Ok(Self {
            transactions_received,
            transactions_rejected,
            blocks_committed,
            chain_height,
            batch_rejections,
            registry,
        })
    }

    /// Record a transaction entering the open block
    pub fn record_transaction_received(&self) {
        self.transactions_received.inc();
    }

    /// Record a batch that lost `count` transactions to validation
    pub fn record_batch_rejected(&self, count: usize) {
        self.transactions_rejected.inc_by(count as u64);
        self.batch_rejections.observe(count as f64);
    }

    /// Record a block commit
    pub fn record_block_committed(&self, block_number: u64) {
        self.blocks_committed.inc();
        self.chain_height.set(block_number as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format of every registered metric
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_received", &self.transactions_received.get())
            .field("transactions_rejected", &self.transactions_rejected.get())
            .field("blocks_committed", &self.blocks_committed.get())
            .field("chain_height", &self.chain_height.get())
            .finish_non_exhaustive()
    }
}
