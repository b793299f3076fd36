//! Agent transaction loop
//!
//! Every agent runs a fixed number of transactions against the shared ledger:
//!
//! ```text
//!  START ─► GENERATE ─► APPLY_LEDGER ─► APPEND_LOG ─┬─► (think) ─► GENERATE ...
//!                            │                       │
//!                            │ error                 │ error
//!                            ▼                       ▼
//!                          ABORT ◄──────────────── ROLLBACK (apply -delta)
//!
//!  after the last transaction: FINISH
//! ```
//!
//! A failed log append is compensated by a second, independent ledger update
//! with the negated delta. Nothing is written to the log for it: the failed
//! delta never made it there. The agent then aborts whatever the outcome of
//! the compensation, and the error tells the two cases apart.

use crate::{
    generator::DeltaSource,
    ledger::Ledger,
    metrics::Metrics,
    storage::Journal,
    types::{AgentId, AgentReport},
    Error, Result,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// A worker applying its transactions to the ledger and its own log
pub struct Agent {
    /// Identity (also names the log)
    id: AgentId,

    /// Planned transactions
    operations: usize,

    /// Where deltas come from
    deltas: Box<dyn DeltaSource>,

    /// Shared ledger
    ledger: Ledger,

    /// Log storage, written only for this agent's id
    journal: Arc<dyn Journal>,

    /// Upper bound (exclusive) of the pause between transactions
    max_think: Duration,

    /// Metrics
    metrics: Metrics,
}

impl Agent {
    /// Create an agent with no think-time
    pub fn new(
        id: AgentId,
        operations: usize,
        deltas: Box<dyn DeltaSource>,
        ledger: Ledger,
        journal: Arc<dyn Journal>,
        metrics: Metrics,
    ) -> Self {
        Self {
            id,
            operations,
            deltas,
            ledger,
            journal,
            max_think: Duration::ZERO,
            metrics,
        }
    }

    /// Pause for a random time below `max_think` between transactions
    pub fn with_think_time(mut self, max_think: Duration) -> Self {
        self.max_think = max_think;
        self
    }

    /// Agent identity
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Run every transaction; an error means the agent aborted
    pub async fn run(mut self) -> Result<AgentReport> {
        let span = tracing::info_span!("agent", agent = %self.id);
        async move {
            let mut committed = Vec::with_capacity(self.operations);
            let mut last_balance = None;

            for op in 0..self.operations {
                let delta = self.deltas.next_delta()?;
                let balance = self.transact(delta).await?;

                committed.push(delta);
                last_balance = Some(balance);
                tracing::debug!(op, delta, balance, "Transaction committed");

                if op + 1 < self.operations {
                    self.think().await;
                }
            }

            let report = AgentReport {
                agent: self.id.clone(),
                committed,
                last_balance,
            };
            tracing::info!(
                transactions = report.committed.len(),
                net = ?report.net(),
                "Agent finished successfully"
            );

            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// One transaction: ledger update, then log append, rollback if the log fails
    async fn transact(&self, delta: i64) -> Result<i64> {
        let balance = self.ledger.apply(delta).await.map_err(|e| {
            tracing::error!(delta, "Can't update ledger: {}", e);
            e
        })?;

        if let Err(log_error) = self.journal.append(&self.id, delta) {
            tracing::error!(delta, "Can't log operation: {}", log_error);
            return Err(self.roll_back(delta, log_error).await);
        }

        self.metrics.transactions.inc();
        Ok(balance)
    }

    /// Compensate an unlogged ledger update
    async fn roll_back(&self, delta: i64, cause: Error) -> Error {
        match self.ledger.apply(-delta).await {
            Ok(balance) => {
                self.metrics.rollbacks.inc();
                tracing::warn!(delta, balance, "Ledger update rolled back");
                Error::RolledBack {
                    agent: self.id.clone(),
                    delta,
                    reason: cause.to_string(),
                }
            }
            Err(rollback_error) => {
                self.metrics.rollback_failures.inc();
                tracing::error!(delta, "Rollback failed: {}", rollback_error);
                Error::RollbackFailed {
                    agent: self.id.clone(),
                    delta,
                    reason: format!("{}; rollback: {}", cause, rollback_error),
                }
            }
        }
    }

    async fn think(&self) {
        let max_ms = self.max_think.as_millis() as u64;
        if max_ms == 0 {
            return;
        }
        let pause = rand::thread_rng().gen_range(0..max_ms);
        if pause > 0 {
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
    }
}
