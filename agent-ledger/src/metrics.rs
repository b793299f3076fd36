//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for a supervised run.
//!
//! # Metrics
//!
//! - `agents_spawned_total` - Agents started by the supervisor
//! - `agents_skipped_total` - Agents given up on after spawn retries
//! - `agent_failures_total` - Agents that terminated abnormally
//! - `ledger_transactions_total` - Transactions committed to ledger and log
//! - `ledger_rollbacks_total` - Compensating updates that succeeded
//! - `ledger_rollback_failures_total` - Compensating updates that failed
//! - `ledger_lock_wait_seconds` - Time spent waiting for the ledger lock
//! - `ledger_apply_duration_seconds` - Time spent inside the critical section

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Agents started
    pub agents_spawned: IntCounter,

    /// Agents skipped after spawn retries
    pub agents_skipped: IntCounter,

    /// Agents that aborted
    pub agent_failures: IntCounter,

    /// Committed transactions
    pub transactions: IntCounter,

    /// Successful rollbacks
    pub rollbacks: IntCounter,

    /// Failed rollbacks
    pub rollback_failures: IntCounter,

    /// Lock wait histogram
    pub lock_wait: Histogram,

    /// Critical section duration histogram
    pub apply_duration: Histogram,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let agents_spawned = counter("agents_spawned_total", "Agents started by the supervisor")?;
        let agents_skipped =
            counter("agents_skipped_total", "Agents given up on after spawn retries")?;
        let agent_failures = counter("agent_failures_total", "Agents that terminated abnormally")?;
        let transactions = counter(
            "ledger_transactions_total",
            "Transactions committed to ledger and log",
        )?;
        let rollbacks = counter("ledger_rollbacks_total", "Compensating updates that succeeded")?;
        let rollback_failures = counter(
            "ledger_rollback_failures_total",
            "Compensating updates that failed",
        )?;

        let lock_wait = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_lock_wait_seconds",
                "Time spent waiting for the ledger lock",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(lock_wait.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_apply_duration_seconds",
                "Time spent inside the ledger critical section",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.010, 0.050, 0.100]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        Ok(Self {
            agents_spawned,
            agents_skipped,
            agent_failures,
            transactions,
            rollbacks,
            rollback_failures,
            lock_wait,
            apply_duration,
            registry,
        })
    }

    /// Record lock wait
    pub fn record_lock_wait(&self, duration_seconds: f64) {
        self.lock_wait.observe(duration_seconds);
    }

    /// Record critical section duration
    pub fn record_apply_duration(&self, duration_seconds: f64) {
        self.apply_duration.observe(duration_seconds);
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
