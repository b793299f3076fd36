//! Test doubles shared by the integration tests

#![allow(dead_code)]

use agent_ledger::{
    AgentId, Config, DeltaSource, DeltaSourceFactory, Error, FileJournal, FileLedger, Journal,
    LedgerStore, LockNamespace, Result, ScriptedDeltas, Supervisor,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Config rooted in `temp` with no think-time and fast retries
pub fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.data_dir = temp.path().to_path_buf();
    config.workload.max_think_ms = 0;
    config.workload.seed = Some(7);
    config.spawn.backoff_ms = 5;
    config.lock.create_backoff_ms = 1;
    config
}

/// Supervisor with its own lock namespace
pub fn isolated_supervisor(config: Config) -> Supervisor {
    Supervisor::new(config)
        .unwrap()
        .with_namespace(Arc::new(LockNamespace::new()))
}

/// Delta sources replaying one script per agent, by roster index
pub fn scripted(scripts: Vec<Vec<i64>>) -> DeltaSourceFactory {
    Arc::new(move |_: &AgentId, index: usize| {
        Box::new(ScriptedDeltas::new(scripts[index].clone())) as Box<dyn DeltaSource>
    })
}

/// Journal failing one agent's append with a given (0-based) index
pub struct FaultyJournal {
    inner: FileJournal,
    victim: AgentId,
    fail_at: usize,
    victim_appends: AtomicUsize,
}

impl FaultyJournal {
    pub fn new(dir: &std::path::Path, victim: &str, fail_at: usize) -> Self {
        Self {
            inner: FileJournal::new(dir),
            victim: AgentId::new(victim),
            fail_at,
            victim_appends: AtomicUsize::new(0),
        }
    }
}

impl Journal for FaultyJournal {
    fn reset(&self, agent: &AgentId) -> Result<()> {
        self.inner.reset(agent)
    }

    fn append(&self, agent: &AgentId, delta: i64) -> Result<()> {
        if *agent == self.victim
            && self.victim_appends.fetch_add(1, Ordering::SeqCst) == self.fail_at
        {
            return Err(Error::LogAppend {
                agent: agent.clone(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.append(agent, delta)
    }

    fn entries(&self, agent: &AgentId) -> Result<Vec<i64>> {
        self.inner.entries(agent)
    }
}

/// One critical section as seen by the store
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub read: i64,
    pub written: i64,
}

/// Ledger store recording every read/write pair and flagging overlaps
pub struct RecordingLedger {
    inner: FileLedger,
    inside: AtomicBool,
    pending: Mutex<Option<i64>>,
    pub sections: Mutex<Vec<Section>>,
    pub overlaps: AtomicUsize,
}

impl RecordingLedger {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self {
            inner: FileLedger::new(path),
            inside: AtomicBool::new(false),
            pending: Mutex::new(None),
            sections: Mutex::new(Vec::new()),
            overlaps: AtomicUsize::new(0),
        }
    }
}

impl LedgerStore for RecordingLedger {
    fn init(&self, value: i64) -> Result<()> {
        self.inner.init(value)
    }

    fn load(&self) -> Result<i64> {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let value = self.inner.load()?;
        *self.pending.lock() = Some(value);
        // Widen the window a concurrent writer would need to slip through
        std::thread::yield_now();
        Ok(value)
    }

    fn store(&self, value: i64) -> Result<()> {
        self.inner.store(value)?;
        if let Some(read) = self.pending.lock().take() {
            self.sections.lock().push(Section {
                read,
                written: value,
            });
        }
        self.inside.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Per-agent log contents read from disk
pub fn logs(temp: &TempDir, agents: &[&str]) -> HashMap<String, Vec<i64>> {
    let journal = FileJournal::new(temp.path());
    agents
        .iter()
        .map(|a| (a.to_string(), journal.entries(&AgentId::new(*a)).unwrap()))
        .collect()
}
