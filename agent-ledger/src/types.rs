//! Core types shared by agents, the supervisor and the auditor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Agent identity token (also the name of the agent's log file)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Create new agent ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generated identity for the agent at `index`: a, b, ..., z, aa, ab, ...
    pub fn generated(index: usize) -> Self {
        let mut n = index;
        let mut name = Vec::new();
        loop {
            name.push(b'a' + (n % 26) as u8);
            if n < 26 {
                break;
            }
            n = n / 26 - 1;
        }
        name.reverse();
        Self(String::from_utf8_lossy(&name).into_owned())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of an agent that completed every planned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    /// Agent identity
    pub agent: AgentId,

    /// Deltas committed to both ledger and log, in order
    pub committed: Vec<i64>,

    /// Ledger value returned by the agent's last `apply`
    pub last_balance: Option<i64>,
}

impl AgentReport {
    /// Sum of committed deltas, `None` if it leaves the `i64` range
    pub fn net(&self) -> Option<i64> {
        self.committed
            .iter()
            .try_fold(0i64, |acc, delta| acc.checked_add(*delta))
    }
}

/// Per-agent log summary read back by the auditor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    /// Agent owning the log
    pub agent: AgentId,

    /// Logged deltas in append order
    pub entries: Vec<i64>,
}

impl LogSummary {
    /// Sum of logged deltas, `None` if it leaves the `i64` range
    pub fn sum(&self) -> Option<i64> {
        self.entries
            .iter()
            .try_fold(0i64, |acc, delta| acc.checked_add(*delta))
    }
}

/// Outcome of a successful reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Starting sum plus every logged delta
    pub expected: i64,

    /// Final ledger value
    pub actual: i64,

    /// Number of log entries reconciled
    pub entries: usize,
}

/// Summary of a whole supervised run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier (UUIDv7 for time-ordering)
    pub run_id: Uuid,

    /// When the supervisor started initialization
    pub started_at: DateTime<Utc>,

    /// When the audit finished
    pub finished_at: DateTime<Utc>,

    /// Agents the supervisor planned to run (after clamping)
    pub agents_planned: usize,

    /// Agents that completed all transactions
    pub completed: Vec<AgentReport>,

    /// Agents that could not be spawned
    pub skipped: Vec<AgentId>,

    /// Reconciliation result
    pub audit: AuditReport,
}

impl RunReport {
    /// True if every planned agent ran to completion
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.completed.len() == self.agents_planned
    }
}
