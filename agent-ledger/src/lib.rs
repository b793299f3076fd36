//! DelTran Agent Ledger
//!
//! Concurrent agents mutating one shared ledger under mutual exclusion, each
//! keeping a private log, with a supervisor that stops the whole run on the
//! first failure and audits the logs against the ledger afterwards.
//!
//! # Architecture
//!
//! - **Binary lock**: One semaphore serializes every ledger read-modify-write
//! - **Agents**: Tokio tasks running a fixed number of transactions each
//! - **Compensation**: A failed log append is undone by a negated ledger update
//! - **Fail-fast**: The first abnormal agent exit aborts every other agent
//!
//! # Invariants
//!
//! - Conservation: final ledger == starting sum + Σ(entries of every log)
//! - Mutual exclusion: no two ledger updates observe the same prior value
//! - Single writer: each log is written by its own agent only

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod types;
pub mod error;
pub mod config;
pub mod sync;
pub mod storage;
pub mod ledger;
pub mod generator;
pub mod agent;
pub mod audit;
pub mod supervisor;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{AgentId, AgentReport, AuditReport, LogSummary, RunReport};
pub use config::Config;
pub use sync::{LedgerLock, LockNamespace};
pub use storage::{FileJournal, FileLedger, Journal, LedgerStore};
pub use ledger::Ledger;
pub use generator::{DeltaSource, RandomDeltas, ScriptedDeltas};
pub use agent::Agent;
pub use audit::{reconcile, Auditor};
pub use supervisor::{DeltaSourceFactory, Dispatch, Supervisor};
pub use metrics::Metrics;
