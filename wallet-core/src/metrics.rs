//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `wallet_funds_total` - Successful fund operations
//! - `wallet_withdrawals_total` - Successful withdraw operations
//! - `wallet_transfers_total` - Successful transfer operations
//! - `wallet_rejections_total` - Operations rejected by validation
//! - `wallet_commit_duration_seconds` - Histogram of unit-of-work commit latencies
//! - `wallet_lock_wait_duration_seconds` - Histogram of wallet lock waits

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Successful fund operations
    pub funds_total: IntCounter,

    /// Successful withdraw operations
    pub withdrawals_total: IntCounter,

    /// Successful transfer operations
    pub transfers_total: IntCounter,

    /// Operations rejected by validation
    pub rejections_total: IntCounter,

    /// Commit latency histogram
    pub commit_duration: Histogram,

    /// Lock wait histogram
    pub lock_wait_duration: Histogram,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let funds_total =
            IntCounter::new("wallet_funds_total", "Successful fund operations")?;
        registry.register(Box::new(funds_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("wallet_withdrawals_total", "Successful withdraw operations")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let transfers_total =
            IntCounter::new("wallet_transfers_total", "Successful transfer operations")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let rejections_total = IntCounter::new(
            "wallet_rejections_total",
            "Operations rejected by validation",
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_commit_duration_seconds",
                "Histogram of unit-of-work commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        let lock_wait_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_lock_wait_duration_seconds",
                "Histogram of wallet lock waits",
            )
            .buckets(vec![0.0001, 0.001, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(lock_wait_duration.clone()))?;

        Ok(Self {
            funds_total,
            withdrawals_total,
            transfers_total,
            rejections_total,
            commit_duration,
            lock_wait_duration,
            registry,
        })
    }

    /// Record a successful fund
    pub fn record_fund(&self) {
        self.funds_total.inc();
    }

    /// Record a successful withdraw
    pub fn record_withdraw(&self) {
        self.withdrawals_total.inc();
    }

    /// Record a successful transfer
    pub fn record_transfer(&self) {
        self.transfers_total.inc();
    }

    /// Record a validation rejection
    pub fn record_rejection(&self) {
        self.rejections_total.inc();
    }

    /// Record a commit latency observation
    pub fn observe_commit(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Record a lock wait observation
    pub fn observe_lock_wait(&self, duration_seconds: f64) {
        self.lock_wait_duration.observe(duration_seconds);
    }

    /// Registry for scraping by the embedding service
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.funds_total.get(), 0);
        assert_eq!(metrics.rejections_total.get(), 0);
    }

    #[test]
    fn test_independent_instances() {
        // Each collector owns its registry, so two instances never collide
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_fund();
        assert_eq!(a.funds_total.get(), 1);
        assert_eq!(b.funds_total.get(), 0);
    }

    #[test]
    fn test_record_operations() {
        let metrics = Metrics::new().unwrap();
        metrics.record_fund();
        metrics.record_withdraw();
        metrics.record_transfer();
        metrics.record_transfer();
        metrics.record_rejection();
        assert_eq!(metrics.funds_total.get(), 1);
        assert_eq!(metrics.withdrawals_total.get(), 1);
        assert_eq!(metrics.transfers_total.get(), 2);
        assert_eq!(metrics.rejections_total.get(), 1);
    }

    #[test]
    fn test_gather_exposes_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_fund();
        metrics.observe_commit(0.002);
        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "wallet_funds_total"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "wallet_commit_duration_seconds"));
    }
}
