//! Synchronization primitive guarding the shared ledger
//!
//! The ledger is protected by a binary semaphore. The supervisor creates it
//! under a well-known name, unlinks the name straight away so nothing else
//! can attach to it, and hands clones of the [`LedgerLock`] handle to every
//! agent. Clones share one underlying semaphore; unlinking the name does not
//! invalidate handles that already exist.
//!
//! ```text
//!   supervisor ── create("/semaphore") ──► LockNamespace { "/semaphore" → sem }
//!        │
//!        └──── unlink("/semaphore") ─────► LockNamespace { }
//!                                            sem still shared by:
//!                      agent a ── LedgerLock ─┐
//!                      agent b ── LedgerLock ─┼──► Semaphore(1)
//!                      agent c ── LedgerLock ─┘
//! ```

use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Registry of named locks, the in-process stand-in for the IPC namespace
#[derive(Debug, Default)]
pub struct LockNamespace {
    names: DashMap<String, Arc<Semaphore>>,
}

static GLOBAL_NAMESPACE: OnceLock<Arc<LockNamespace>> = OnceLock::new();

impl LockNamespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide namespace
    pub fn global() -> Arc<LockNamespace> {
        GLOBAL_NAMESPACE
            .get_or_init(|| Arc::new(LockNamespace::new()))
            .clone()
    }

    /// Register a new binary lock under `name`
    ///
    /// Fails if the name is malformed or already registered.
    pub fn create(&self, name: &str) -> Result<LedgerLock> {
        validate_name(name)?;

        match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::Lock(format!("lock name {} is in use", name))),
            Entry::Vacant(slot) => {
                let semaphore = Arc::new(Semaphore::new(1));
                slot.insert(semaphore.clone());
                tracing::debug!(name, "Lock created");
                Ok(LedgerLock {
                    name: name.to_string(),
                    semaphore,
                })
            }
        }
    }

    /// Create with a bounded number of attempts while the name is in use
    pub async fn create_with_retry(
        &self,
        name: &str,
        attempts: u32,
        backoff: Duration,
    ) -> Result<LedgerLock> {
        validate_name(name)?;

        let mut last_error = None;
        for attempt in 1..=attempts.max(1) {
            match self.create(name) {
                Ok(lock) => return Ok(lock),
                Err(e) => {
                    tracing::warn!(name, attempt, attempts, "Lock creation failed: {}", e);
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Lock(format!("could not create lock {}", name))))
    }

    /// Remove `name` from the namespace; existing handles stay valid
    pub fn unlink(&self, name: &str) -> Result<()> {
        match self.names.remove(name) {
            Some(_) => {
                tracing::debug!(name, "Lock unlinked");
                Ok(())
            }
            None => Err(Error::Lock(format!("lock {} is not registered", name))),
        }
    }

    /// Attach to a lock that is still registered
    pub fn open(&self, name: &str) -> Option<LedgerLock> {
        self.names.get(name).map(|entry| LedgerLock {
            name: name.to_string(),
            semaphore: entry.value().clone(),
        })
    }

    /// True if `name` is currently registered
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = name.len() > 1 && name.starts_with('/') && !name[1..].contains('/');
    if valid {
        Ok(())
    } else {
        Err(Error::Lock(format!("invalid lock name {:?}", name)))
    }
}

/// Handle to the binary lock serializing ledger access
#[derive(Debug, Clone)]
pub struct LedgerLock {
    name: String,
    semaphore: Arc<Semaphore>,
}

/// Proof of sole holdership; dropping it releases the lock
#[derive(Debug)]
pub struct LockGuard<'a> {
    _permit: SemaphorePermit<'a>,
}

impl LedgerLock {
    /// Wait until the caller is the sole holder
    pub async fn acquire(&self) -> Result<LockGuard<'_>> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Lock(format!("lock {} is closed", self.name)))?;
        Ok(LockGuard { _permit: permit })
    }

    /// Name the lock was created under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if nobody holds the lock
    pub fn is_free(&self) -> bool {
        self.semaphore.available_permits() == 1
    }

    /// Destroy the lock; later `acquire` calls on any clone fail
    pub fn close(self) -> Result<()> {
        if self.semaphore.is_closed() {
            return Err(Error::Lock(format!("lock {} already closed", self.name)));
        }
        if !self.is_free() {
            return Err(Error::Lock(format!("lock {} closed while held", self.name)));
        }
        self.semaphore.close();
        tracing::debug!(name = %self.name, "Lock closed");
        Ok(())
    }
}
