//! Error types for the agent ledger

use crate::types::AgentId;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Agent ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Run initialization failed (stale logs, ledger file, data directory)
    #[error("Initialization failed: {0}")]
    Init(String),

    /// Synchronization primitive could not be created, used or destroyed
    #[error("Lock error: {0}")]
    Lock(String),

    /// Agent could not be spawned after all retries
    #[error("Agent {agent} could not be spawned after {attempts} attempts")]
    SpawnExhausted {
        /// Agent that was skipped
        agent: AgentId,
        /// Number of spawn attempts made
        attempts: u32,
    },

    /// Ledger could not be read or persisted
    #[error("Ledger access failed: {0}")]
    LedgerAccess(String),

    /// Agent log could not be appended
    #[error("Log append failed for agent {agent}: {reason}")]
    LogAppend {
        /// Agent owning the log
        agent: AgentId,
        /// Underlying failure
        reason: String,
    },

    /// Agent log contains an entry that is not a signed integer
    #[error("Log of agent {agent} is corrupt at line {line}: {content:?}")]
    LogCorrupt {
        /// Agent owning the log
        agent: AgentId,
        /// 1-based line number
        line: usize,
        /// Offending line
        content: String,
    },

    /// Log append failed and the ledger update was compensated
    #[error("Agent {agent} rolled back delta {delta}: {reason}")]
    RolledBack {
        /// Agent that aborted
        agent: AgentId,
        /// Delta that was reversed on the ledger
        delta: i64,
        /// Why the log append failed
        reason: String,
    },

    /// Log append failed and the compensating update failed too
    #[error("Agent {agent} failed to roll back delta {delta}, ledger is inconsistent: {reason}")]
    RollbackFailed {
        /// Agent that aborted
        agent: AgentId,
        /// Delta that remains applied to the ledger without a log entry
        delta: i64,
        /// Why the compensation failed
        reason: String,
    },

    /// An agent terminated abnormally; the whole run was stopped
    #[error("Agent {agent} terminated abnormally: {source}")]
    AgentFailed {
        /// Agent that failed first
        agent: AgentId,
        /// Failure reported by the agent (or its panic)
        #[source]
        source: Box<Error>,
    },

    /// An agent task panicked or was cancelled
    #[error("Agent task died: {0}")]
    TaskDied(String),

    /// Reconciliation of logs against the ledger failed
    #[error("Audit mismatch: expected {expected}, ledger holds {actual}")]
    AuditMismatch {
        /// Starting sum plus every logged delta
        expected: i64,
        /// Final ledger value
        actual: i64,
    },

    /// Starting sum plus the logged deltas leaves the `i64` range
    #[error("Log sum overflows at agent {agent}")]
    AuditOverflow {
        /// Agent whose log pushed the sum out of range
        agent: AgentId,
    },

    /// Delta source has no more operations
    #[error("Delta source exhausted after {0} operations")]
    DeltaSourceExhausted(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True if the ledger may now hold an update that no log accounts for
    pub fn is_inconsistent(&self) -> bool {
        match self {
            Error::RollbackFailed { .. } => true,
            Error::AgentFailed { source, .. } => source.is_inconsistent(),
            _ => false,
        }
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Other(format!("metrics: {}", err))
    }
}
