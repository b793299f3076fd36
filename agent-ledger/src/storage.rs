//! Storage layer for the ledger value and the agent logs
//!
//! # Files
//!
//! - `<data_dir>/<ledger_file>` - the ledger, one decimal integer, overwritten on every store
//! - `<data_dir>/<agent id>` - one log per agent, newline-delimited signed deltas, append-only
//!
//! Both stores are plain traits so the ledger and the agents can be driven
//! against in-memory or fault-injecting implementations.

use crate::{
    error::{Error, Result},
    types::AgentId,
};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Backing store of the shared ledger value
///
/// Implementations do no locking of their own; callers serialize access.
pub trait LedgerStore: Send + Sync {
    /// Create or overwrite the ledger with `value`
    fn init(&self, value: i64) -> Result<()>;

    /// Read the current value
    fn load(&self) -> Result<i64>;

    /// Overwrite the current value
    fn store(&self, value: i64) -> Result<()>;
}

/// Backing store of the per-agent logs
///
/// Each agent only ever writes its own log.
pub trait Journal: Send + Sync {
    /// Delete the agent's log if present
    fn reset(&self, agent: &AgentId) -> Result<()>;

    /// Append one delta to the agent's log
    fn append(&self, agent: &AgentId, delta: i64) -> Result<()>;

    /// All deltas in the agent's log, in append order
    fn entries(&self, agent: &AgentId) -> Result<Vec<i64>>;
}

/// Ledger stored as a text file
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    /// Ledger at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn access_error(&self, action: &str, err: impl std::fmt::Display) -> Error {
        Error::LedgerAccess(format!("{} {}: {}", action, self.path.display(), err))
    }
}

impl LedgerStore for FileLedger {
    fn init(&self, value: i64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Init(format!("creating {}: {}", parent.display(), e)))?;
            }
        }
        fs::write(&self.path, format!("{}\n", value))
            .map_err(|e| Error::Init(format!("creating ledger {}: {}", self.path.display(), e)))?;

        tracing::info!(path = %self.path.display(), value, "Ledger initialized");
        Ok(())
    }

    fn load(&self) -> Result<i64> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| self.access_error("reading", e))?;
        content
            .trim()
            .parse()
            .map_err(|e| self.access_error("parsing", e))
    }

    fn store(&self, value: i64) -> Result<()> {
        fs::write(&self.path, value.to_string()).map_err(|e| self.access_error("writing", e))
    }
}

/// Agent logs stored as one text file per agent
#[derive(Debug, Clone)]
pub struct FileJournal {
    dir: PathBuf,
}

impl FileJournal {
    /// Logs inside `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of an agent's log
    pub fn path_of(&self, agent: &AgentId) -> PathBuf {
        self.dir.join(agent.as_str())
    }
}

impl Journal for FileJournal {
    fn reset(&self, agent: &AgentId) -> Result<()> {
        let path = self.path_of(agent);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(agent = %agent, "Stale log removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Init(format!(
                "deleting log {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn append(&self, agent: &AgentId, delta: i64) -> Result<()> {
        let path = self.path_of(agent);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::LogAppend {
                agent: agent.clone(),
                reason: format!("opening {}: {}", path.display(), e),
            })?;

        writeln!(file, "{}", delta).map_err(|e| Error::LogAppend {
            agent: agent.clone(),
            reason: format!("writing {}: {}", path.display(), e),
        })
    }

    fn entries(&self, agent: &AgentId) -> Result<Vec<i64>> {
        let path = self.path_of(agent);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(agent = %agent, "No log found, counting it as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                line.trim().parse().map_err(|_| Error::LogCorrupt {
                    agent: agent.clone(),
                    line: i + 1,
                    content: line.to_string(),
                })
            })
            .collect()
    }
}
