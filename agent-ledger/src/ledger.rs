//! Shared ledger access
//!
//! [`Ledger::apply`] is the only way agents touch the ledger. Each call is its
//! own critical section: acquire the lock, read, add the delta, persist,
//! release. A rollback is simply a second `apply` with the negated delta.
//!
//! # Example
//!
//! ```no_run
//! use agent_ledger::{FileLedger, Ledger, LockNamespace, Metrics};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> agent_ledger::Result<()> {
//!     let namespace = LockNamespace::new();
//!     let lock = namespace.create("/example")?;
//!     namespace.unlink("/example")?;
//!
//!     let metrics = Metrics::new()?;
//!     let ledger = Ledger::new(Arc::new(FileLedger::new("./account")), lock, metrics);
//!     let balance = ledger.apply(5).await?;
//!     println!("balance is now {}", balance);
//!     Ok(())
//! }
//! ```

use crate::{metrics::Metrics, storage::LedgerStore, sync::LedgerLock, Result};
use std::sync::Arc;
use std::time::Instant;

/// Handle on the shared ledger; clones share the store and the lock
#[derive(Clone)]
pub struct Ledger {
    /// Backing store
    store: Arc<dyn LedgerStore>,

    /// Lock serializing every read-modify-write
    lock: LedgerLock,

    /// Metrics
    metrics: Metrics,
}

impl Ledger {
    /// Create a ledger handle
    pub fn new(store: Arc<dyn LedgerStore>, lock: LedgerLock, metrics: Metrics) -> Self {
        Self {
            store,
            lock,
            metrics,
        }
    }

    /// Add `delta` to the ledger under the lock and return the new value
    ///
    /// The lock is released on every path, including read and write failures.
    pub async fn apply(&self, delta: i64) -> Result<i64> {
        let waiting = Instant::now();
        let _guard = self.lock.acquire().await?;
        self.metrics.record_lock_wait(waiting.elapsed().as_secs_f64());

        let started = Instant::now();
        let current = self.store.load()?;
        let updated = current.checked_add(delta).ok_or_else(|| {
            crate::Error::LedgerAccess(format!("{} + {} overflows", current, delta))
        })?;
        self.store.store(updated)?;
        self.metrics.record_apply_duration(started.elapsed().as_secs_f64());

        tracing::trace!(current, delta, updated, "Ledger updated");
        Ok(updated)
    }

    /// Read the ledger without locking
    ///
    /// Only meaningful once every agent has terminated.
    pub fn read_quiescent(&self) -> Result<i64> {
        self.store.load()
    }

    /// The lock guarding this ledger
    pub fn lock(&self) -> &LedgerLock {
        &self.lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileLedger;
    use crate::sync::LockNamespace;
    use crate::Error;

    fn test_ledger(start: i64) -> (Ledger, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let store = FileLedger::new(temp.path().join("account"));
        store.init(start).unwrap();

        let ns = LockNamespace::new();
        let lock = ns.create("/ledger-test").unwrap();
        ns.unlink("/ledger-test").unwrap();

        (Ledger::new(Arc::new(store), lock, Metrics::new().unwrap()), temp)
    }

    #[tokio::test]
    async fn test_apply_returns_new_value() {
        let (ledger, _temp) = test_ledger(100);
        assert_eq!(ledger.apply(4).await.unwrap(), 104);
        assert_eq!(ledger.apply(-6).await.unwrap(), 98);
        assert_eq!(ledger.read_quiescent().unwrap(), 98);
    }

    #[tokio::test]
    async fn test_rollback_is_second_apply() {
        let (ledger, _temp) = test_ledger(100);
        ledger.apply(7).await.unwrap();
        assert_eq!(ledger.apply(-7).await.unwrap(), 100);
        assert_eq!(ledger.metrics.lock_wait.get_sample_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_releases_lock() {
        let (ledger, temp) = test_ledger(100);
        std::fs::remove_file(temp.path().join("account")).unwrap();

        assert!(matches!(ledger.apply(1).await, Err(Error::LedgerAccess(_))));
        assert!(ledger.lock().is_free());
    }

    #[tokio::test]
    async fn test_overflow_is_rejected() {
        let (ledger, _temp) = test_ledger(i64::MAX);
        assert!(ledger.apply(1).await.is_err());
        assert_eq!(ledger.read_quiescent().unwrap(), i64::MAX);
        assert!(ledger.lock().is_free());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_applies_lose_nothing() {
        let (ledger, _temp) = test_ledger(0);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    ledger.apply(1).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(ledger.read_quiescent().unwrap(), 200);
    }
}
