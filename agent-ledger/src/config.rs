//! Configuration for the agent ledger

use crate::types::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Agent ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the ledger file and the agent logs
    pub data_dir: PathBuf,

    /// Ledger file name inside `data_dir`
    pub ledger_file: String,

    /// Initial ledger value
    pub start_sum: i64,

    /// Maximum number of agents per run
    pub max_agents: usize,

    /// Explicit agent identities (generated a, b, c, ... when empty)
    pub agent_names: Vec<String>,

    /// Per-agent workload
    pub workload: WorkloadConfig,

    /// Agent spawn policy
    pub spawn: SpawnConfig,

    /// Synchronization primitive
    pub lock: LockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            ledger_file: "account".to_string(),
            start_sum: 100,
            max_agents: 8,
            agent_names: Vec::new(),
            workload: WorkloadConfig::default(),
            spawn: SpawnConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

/// Per-agent workload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Transactions per agent
    pub operations: usize,

    /// Maximum absolute value of one delta
    pub max_delta: i64,

    /// Upper bound (exclusive) of the think-time between transactions, 0 disables it
    pub max_think_ms: u64,

    /// Base seed for the delta generators (wall clock when absent)
    pub seed: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            operations: 5,
            max_delta: 10,
            max_think_ms: 1000,
            seed: None,
        }
    }
}

/// Agent spawn configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Spawn attempts per agent before it is skipped
    pub max_attempts: u32,

    /// Fixed delay between spawn attempts (milliseconds)
    pub backoff_ms: u64,

    /// Agents that may be alive at the same time
    pub max_live_agents: usize,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff_ms: 5000,
            max_live_agents: 64,
        }
    }
}

/// Synchronization primitive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Name registered in the lock namespace while the primitive is created
    pub name: String,

    /// Creation attempts while the name is held by another run
    pub create_attempts: u32,

    /// Fixed delay between creation attempts (milliseconds)
    pub create_backoff_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            name: "/semaphore".to_string(),
            create_attempts: 20,
            create_backoff_ms: 50,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = match std::env::var("AGENT_LEDGER_CONFIG") {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };

        if let Ok(data_dir) = std::env::var("AGENT_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(value) = std::env::var("AGENT_LEDGER_START_SUM") {
            config.start_sum = parse_env("AGENT_LEDGER_START_SUM", &value)?;
        }

        if let Ok(value) = std::env::var("AGENT_LEDGER_OPERATIONS") {
            config.workload.operations = parse_env("AGENT_LEDGER_OPERATIONS", &value)?;
        }

        if let Ok(value) = std::env::var("AGENT_LEDGER_MAX_THINK_MS") {
            config.workload.max_think_ms = parse_env("AGENT_LEDGER_MAX_THINK_MS", &value)?;
        }

        if let Ok(value) = std::env::var("AGENT_LEDGER_SEED") {
            config.workload.seed = Some(parse_env("AGENT_LEDGER_SEED", &value)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no run can execute
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_agents == 0 {
            return Err(crate::Error::Config("max_agents must be at least 1".to_string()));
        }
        if self.workload.operations == 0 {
            return Err(crate::Error::Config("operations must be at least 1".to_string()));
        }
        if self.workload.max_delta <= 0 {
            return Err(crate::Error::Config("max_delta must be positive".to_string()));
        }
        if self.spawn.max_attempts == 0 || self.lock.create_attempts == 0 {
            return Err(crate::Error::Config("retry attempts must be at least 1".to_string()));
        }
        if self.spawn.max_live_agents == 0 {
            return Err(crate::Error::Config("max_live_agents must be at least 1".to_string()));
        }
        if self.ledger_file.is_empty() || self.ledger_file.contains(['/', '\\']) {
            return Err(crate::Error::Config(format!(
                "invalid ledger file name {:?}",
                self.ledger_file
            )));
        }

        if !self.agent_names.is_empty() {
            if self.agent_names.len() < self.max_agents {
                return Err(crate::Error::Config(format!(
                    "{} agent names configured, max_agents is {}",
                    self.agent_names.len(),
                    self.max_agents
                )));
            }
            let mut seen = HashSet::new();
            for name in &self.agent_names {
                if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                    return Err(crate::Error::Config(format!("invalid agent name {:?}", name)));
                }
                if *name == self.ledger_file {
                    return Err(crate::Error::Config(format!(
                        "agent name {:?} collides with the ledger file",
                        name
                    )));
                }
                if !seen.insert(name.as_str()) {
                    return Err(crate::Error::Config(format!("duplicate agent name {:?}", name)));
                }
            }
        }

        Ok(())
    }

    /// Clamp a requested agent count to `[1, max_agents]`, defaulting to 1
    pub fn clamp_agents(&self, requested: Option<i64>) -> usize {
        match requested {
            Some(n) if n >= 1 && n as u64 <= self.max_agents as u64 => n as usize,
            Some(n) => {
                tracing::warn!("{} agent(s) defaults to 1", n);
                1
            }
            None => {
                tracing::warn!("0 agent(s) defaults to 1");
                1
            }
        }
    }

    /// Identities of the first `count` agents
    pub fn roster(&self, count: usize) -> Vec<AgentId> {
        (0..count)
            .map(|i| match self.agent_names.get(i) {
                Some(name) => AgentId::new(name.clone()),
                None => AgentId::generated(i),
            })
            .collect()
    }

    /// Path of the ledger file
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("{}={:?}: {}", key, value, e)))
}
