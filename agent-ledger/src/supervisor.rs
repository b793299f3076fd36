//! Supervisor: run lifecycle and fail-fast containment
//!
//! # Lifecycle
//!
//! 1. Plan the roster (clamp the requested agent count, pick identities)
//! 2. Remove stale logs and initialize the ledger with the starting sum
//! 3. Create the ledger lock and unlink its name right away
//! 4. Spawn every agent, retrying while no spawn slot is free
//! 5. Wait for the agents; the first abnormal exit aborts all the others
//! 6. Close the lock and audit the logs of the agents that completed
//!
//! Agents that could not be spawned are skipped and listed in the
//! [`RunReport`]; such a run is not complete even if the audit passes.

use crate::{
    agent::Agent,
    audit::Auditor,
    config::Config,
    generator::{DeltaSource, RandomDeltas},
    ledger::Ledger,
    metrics::Metrics,
    storage::{FileJournal, FileLedger, Journal, LedgerStore},
    sync::{LedgerLock, LockNamespace},
    types::{AgentId, AgentReport, AuditReport, RunReport},
    Error, Result,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{self, JoinError, JoinSet};
use tracing::Instrument;
use uuid::Uuid;

/// Builds the delta source of the agent at a given roster index
pub type DeltaSourceFactory = Arc<dyn Fn(&AgentId, usize) -> Box<dyn DeltaSource> + Send + Sync>;

/// Agents that ran to completion and agents that never started
#[derive(Debug, Clone, Default)]
pub struct Dispatch {
    /// Reports of agents that finished every transaction
    pub completed: Vec<AgentReport>,

    /// Agents skipped after exhausting spawn retries
    pub skipped: Vec<AgentId>,
}

impl Dispatch {
    /// Identities of the completed agents
    pub fn completed_ids(&self) -> Vec<AgentId> {
        self.completed.iter().map(|r| r.agent.clone()).collect()
    }
}

/// Coordinates one run of agents against the shared ledger
pub struct Supervisor {
    config: Config,
    ledger_store: Arc<dyn LedgerStore>,
    journal: Arc<dyn Journal>,
    deltas: DeltaSourceFactory,
    namespace: Arc<LockNamespace>,
    spawn_slots: Arc<Semaphore>,
    metrics: Metrics,
}

impl Supervisor {
    /// Supervisor over the files in `config.data_dir`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let ledger_store = Arc::new(FileLedger::new(config.ledger_path()));
        let journal = Arc::new(FileJournal::new(config.data_dir.clone()));
        let seed = config.workload.seed;
        let max_delta = config.workload.max_delta;
        let deltas: DeltaSourceFactory = Arc::new(move |_agent: &AgentId, index: usize| {
            Box::new(RandomDeltas::for_agent(seed, index, max_delta)) as Box<dyn DeltaSource>
        });

        Ok(Self {
            spawn_slots: Arc::new(Semaphore::new(config.spawn.max_live_agents)),
            config,
            ledger_store,
            journal,
            deltas,
            namespace: LockNamespace::global(),
            metrics: Metrics::new()?,
        })
    }

    /// Use another ledger store
    pub fn with_ledger_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.ledger_store = store;
        self
    }

    /// Use another log store
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = journal;
        self
    }

    /// Use another delta source per agent
    pub fn with_delta_sources(mut self, deltas: DeltaSourceFactory) -> Self {
        self.deltas = deltas;
        self
    }

    /// Create the lock in another namespace
    pub fn with_namespace(mut self, namespace: Arc<LockNamespace>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics of this supervisor's runs
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Full run: initialize, dispatch, audit
    pub async fn run(&self, requested: Option<i64>) -> Result<RunReport> {
        let run_id = Uuid::now_v7();
        let span = tracing::info_span!("run", %run_id);

        async move {
            let started_at = Utc::now();
            let roster = self.plan(requested);

            self.initialize(&roster)?;
            let lock = self.create_lock().await?;

            let dispatched = self.dispatch(&roster, &lock).await;
            let closed = lock.close();
            let dispatch = dispatched?;
            closed?;

            let audit = self.audit(&dispatch.completed_ids())?;
            if !dispatch.skipped.is_empty() {
                tracing::warn!(
                    skipped = dispatch.skipped.len(),
                    "Run finished with a reduced set of agents"
                );
            }

            Ok(RunReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                agents_planned: roster.len(),
                completed: dispatch.completed,
                skipped: dispatch.skipped,
                audit,
            })
        }
        .instrument(span)
        .await
    }

    /// Clamp the requested count and name the agents
    pub fn plan(&self, requested: Option<i64>) -> Vec<AgentId> {
        let count = self.config.clamp_agents(requested);
        tracing::info!("Creating {} agent(s)", count);
        self.config.roster(count)
    }

    /// Remove stale logs and write the starting sum
    pub fn initialize(&self, roster: &[AgentId]) -> Result<()> {
        std::fs::create_dir_all(&self.config.data_dir).map_err(|e| {
            Error::Init(format!(
                "creating data directory {}: {}",
                self.config.data_dir.display(),
                e
            ))
        })?;

        for agent in roster {
            self.journal.reset(agent)?;
        }
        self.ledger_store.init(self.config.start_sum)
    }

    /// Create the ledger lock and drop its name from the namespace
    pub async fn create_lock(&self) -> Result<LedgerLock> {
        let lock_config = &self.config.lock;
        let lock = self
            .namespace
            .create_with_retry(
                &lock_config.name,
                lock_config.create_attempts,
                Duration::from_millis(lock_config.create_backoff_ms),
            )
            .await?;
        self.namespace.unlink(&lock_config.name)?;
        Ok(lock)
    }

    /// Spawn the roster and wait for it, stopping everything on the first failure
    ///
    /// Agents that already finished are collected before every spawn attempt
    /// and during every retry backoff, so a failure stops the run before any
    /// further agent starts.
    pub async fn dispatch(&self, roster: &[AgentId], lock: &LedgerLock) -> Result<Dispatch> {
        let ledger = Ledger::new(self.ledger_store.clone(), lock.clone(), self.metrics.clone());
        let think = Duration::from_millis(self.config.workload.max_think_ms);

        let mut workers = Workers::default();

        for (index, id) in roster.iter().enumerate() {
            let slot = match self.reserve_slot(id, &mut workers).await {
                Ok(slot) => slot,
                Err(e @ Error::SpawnExhausted { .. }) => {
                    tracing::error!(agent = %id, "Agent can't work: {}", e);
                    self.metrics.agents_skipped.inc();
                    workers.dispatch.skipped.push(id.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };

            let agent = Agent::new(
                id.clone(),
                self.config.workload.operations,
                (self.deltas)(id, index),
                ledger.clone(),
                self.journal.clone(),
                self.metrics.clone(),
            )
            .with_think_time(think);

            let handle = workers.tasks.spawn(async move {
                let _slot = slot;
                agent.run().await
            });
            workers.names.insert(handle.id(), id.clone());
            self.metrics.agents_spawned.inc();
        }

        while let Some(joined) = workers.tasks.join_next_with_id().await {
            self.settle(&mut workers, joined).await?;
        }

        Ok(workers.dispatch)
    }

    /// Reconcile the logs of `agents` against the ledger
    pub fn audit(&self, agents: &[AgentId]) -> Result<AuditReport> {
        Auditor::new(
            self.journal.clone(),
            self.ledger_store.clone(),
            self.config.start_sum,
        )
        .audit(agents)
    }

    /// Take a spawn slot, retrying with a fixed backoff while none is free
    ///
    /// Fails with `SpawnExhausted` once the attempts run out, or with
    /// `AgentFailed` if a running agent fails while the supervisor waits.
    async fn reserve_slot(
        &self,
        agent: &AgentId,
        workers: &mut Workers,
    ) -> Result<OwnedSemaphorePermit> {
        let attempts = self.config.spawn.max_attempts;
        let backoff = Duration::from_millis(self.config.spawn.backoff_ms);

        for attempt in 1..=attempts {
            while let Some(joined) = workers.tasks.try_join_next_with_id() {
                self.settle(workers, joined).await?;
            }

            match self.spawn_slots.clone().try_acquire_owned() {
                Ok(slot) => return Ok(slot),
                Err(e) => {
                    tracing::warn!(agent = %agent, attempt, attempts, "Spawn failed: {}", e);
                }
            }
            if attempt == attempts {
                break;
            }

            let retry_at = tokio::time::Instant::now() + backoff;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(retry_at) => break,
                    Some(joined) = workers.tasks.join_next_with_id(), if !workers.tasks.is_empty() => {
                        self.settle(workers, joined).await?;
                    }
                }
            }
        }

        Err(Error::SpawnExhausted {
            agent: agent.clone(),
            attempts,
        })
    }

    /// Record one finished agent; on failure abort and drain all the others
    async fn settle(&self, workers: &mut Workers, joined: Joined) -> Result<()> {
        let (task_id, outcome) = match joined {
            Ok((task_id, outcome)) => (task_id, outcome),
            Err(join_error) => (
                join_error.id(),
                Err(Error::TaskDied(join_error.to_string())),
            ),
        };
        let agent = workers
            .names
            .remove(&task_id)
            .unwrap_or_else(|| AgentId::new("unknown"));

        match outcome {
            Ok(report) => {
                workers.dispatch.completed.push(report);
                Ok(())
            }
            Err(e) => {
                self.metrics.agent_failures.inc();
                tracing::error!(
                    agent = %agent,
                    running = workers.tasks.len(),
                    "Agent failed, stopping all running agents: {}",
                    e
                );
                workers.tasks.abort_all();
                while workers.tasks.join_next().await.is_some() {}
                Err(Error::AgentFailed {
                    agent,
                    source: Box::new(e),
                })
            }
        }
    }
}

type Joined = std::result::Result<(task::Id, Result<AgentReport>), JoinError>;

/// Agents in flight and the outcome collected so far
#[derive(Default)]
struct Workers {
    tasks: JoinSet<Result<AgentReport>>,
    names: HashMap<task::Id, AgentId>,
    dispatch: Dispatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedDeltas;
    use tempfile::TempDir;

    fn test_config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = temp.path().to_path_buf();
        config.workload.max_think_ms = 0;
        config.workload.seed = Some(11);
        config.spawn.backoff_ms = 1;
        config.lock.create_backoff_ms = 1;
        config
    }

    fn isolated(config: Config) -> Supervisor {
        Supervisor::new(config)
            .unwrap()
            .with_namespace(Arc::new(LockNamespace::new()))
    }

    #[test]
    fn test_plan_clamps() {
        let temp = TempDir::new().unwrap();
        let supervisor = isolated(test_config(&temp));
        assert_eq!(supervisor.plan(None).len(), 1);
        assert_eq!(supervisor.plan(Some(0)).len(), 1);
        assert_eq!(supervisor.plan(Some(99)).len(), 1);
        assert_eq!(supervisor.plan(Some(3)).len(), 3);
    }

    #[test]
    fn test_initialize_clears_stale_logs() {
        let temp = TempDir::new().unwrap();
        let supervisor = isolated(test_config(&temp));
        std::fs::write(temp.path().join("a"), "5\n5\n").unwrap();
        std::fs::write(temp.path().join("account"), "999").unwrap();

        let roster = supervisor.plan(Some(2));
        supervisor.initialize(&roster).unwrap();

        assert!(!temp.path().join("a").exists());
        assert_eq!(
            std::fs::read_to_string(temp.path().join("account")).unwrap(),
            "100\n"
        );
    }

    #[tokio::test]
    async fn test_lock_is_unlinked_after_creation() {
        let temp = TempDir::new().unwrap();
        let namespace = Arc::new(LockNamespace::new());
        let supervisor = Supervisor::new(test_config(&temp))
            .unwrap()
            .with_namespace(namespace.clone());

        let lock = supervisor.create_lock().await.unwrap();
        assert!(!namespace.contains("/semaphore"));
        assert!(lock.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_single_agent() {
        let temp = TempDir::new().unwrap();
        let supervisor = isolated(test_config(&temp));

        let report = supervisor.run(None).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].committed.len(), 5);
        assert_eq!(report.audit.expected, report.audit.actual);
        assert_eq!(supervisor.metrics().transactions.get(), 5);
    }

    #[tokio::test]
    async fn test_scripted_run() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp);
        config.workload.operations = 3;

        let scripts = vec![vec![4, -2, 1], vec![5, 3, -6]];
        let supervisor = isolated(config).with_delta_sources(Arc::new(move |_: &AgentId, index: usize| {
            Box::new(ScriptedDeltas::new(scripts[index].clone())) as Box<dyn DeltaSource>
        }));

        let report = supervisor.run(Some(2)).await.unwrap();
        assert_eq!(report.audit.expected, 105);
        assert_eq!(report.audit.actual, 105);
    }
}
