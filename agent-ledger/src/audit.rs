//! Post-run reconciliation of agent logs against the ledger
//!
//! Once every agent has terminated, the ledger must equal the starting sum
//! plus every delta found in the logs of the agents that succeeded. The
//! auditor takes no lock; running it while agents are active is meaningless.

use crate::{
    storage::{Journal, LedgerStore},
    types::{AgentId, AuditReport, LogSummary},
    Error, Result,
};
use std::sync::Arc;

/// Compare `starting_sum + Σ logs` with the final ledger value
pub fn reconcile(starting_sum: i64, logs: &[LogSummary], ledger_final: i64) -> Result<AuditReport> {
    let entries = logs.iter().map(|log| log.entries.len()).sum();

    let mut expected = starting_sum;
    for log in logs {
        expected = log
            .sum()
            .and_then(|sum| expected.checked_add(sum))
            .ok_or_else(|| {
                tracing::error!(agent = %log.agent, "Log sum overflows");
                Error::AuditOverflow {
                    agent: log.agent.clone(),
                }
            })?;
    }

    if expected != ledger_final {
        tracing::error!(
            expected,
            actual = ledger_final,
            "Ledger does not match agent logs"
        );
        return Err(Error::AuditMismatch {
            expected,
            actual: ledger_final,
        });
    }

    tracing::info!(expected, actual = ledger_final, entries, "Ledger matches agent logs");
    Ok(AuditReport {
        expected,
        actual: ledger_final,
        entries,
    })
}

/// Reads logs and the ledger, then reconciles them
pub struct Auditor {
    journal: Arc<dyn Journal>,
    ledger: Arc<dyn LedgerStore>,
    starting_sum: i64,
}

impl Auditor {
    /// Create an auditor
    pub fn new(journal: Arc<dyn Journal>, ledger: Arc<dyn LedgerStore>, starting_sum: i64) -> Self {
        Self {
            journal,
            ledger,
            starting_sum,
        }
    }

    /// Read the logs of `agents`
    pub fn collect(&self, agents: &[AgentId]) -> Result<Vec<LogSummary>> {
        agents
            .iter()
            .map(|agent| {
                let entries = self.journal.entries(agent)?;
                let summary = LogSummary {
                    agent: agent.clone(),
                    entries,
                };
                tracing::info!(agent = %agent, sum = ?summary.sum(), "Log summed");
                Ok(summary)
            })
            .collect()
    }

    /// Reconcile the logs of `agents` against the ledger
    pub fn audit(&self, agents: &[AgentId]) -> Result<AuditReport> {
        tracing::info!(agents = agents.len(), "Auditing");
        let logs = self.collect(agents)?;
        let actual = self.ledger.load()?;
        reconcile(self.starting_sum, &logs, actual)
    }
}
