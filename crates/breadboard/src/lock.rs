//! Per-table exclusive locks for plan-and-apply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// In-process table locks.
///
/// Readers never touch these. Writers lock every table a change touches
/// (both names for a rename), always in sorted order so two writers can't
/// deadlock on each other.
#[derive(Clone, Default)]
pub struct TableLocks {
    inner: Arc<Mutex<LockMap>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to all of `tables`.
    pub async fn acquire<I, S>(&self, tables: I) -> TableLockGuard
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = tables.into_iter().map(|s| s.as_ref().to_string()).collect();
        names.sort();
        names.dedup();

        let mut guards = Vec::with_capacity(names.len());
        for name in &names {
            let mutex = {
                let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(map.entry(name.clone()).or_default())
            };
            guards.push(mutex.lock_owned().await);
        }
        tracing::debug!(tables = ?names, "table locks acquired");

        TableLockGuard {
            guards,
            names,
            locks: self.clone(),
        }
    }

    /// Whether some writer currently holds `table`.
    pub fn is_locked(&self, table: &str) -> bool {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(table).is_some_and(|m| m.try_lock().is_err())
    }
}

/// Releases its tables when dropped.
pub struct TableLockGuard {
    guards: Vec<OwnedMutexGuard<()>>,
    names: Vec<String>,
    locks: TableLocks,
}

impl TableLockGuard {
    pub fn tables(&self) -> &[String] {
        &self.names
    }
}

impl Drop for TableLockGuard {
    fn drop(&mut self) {
        self.guards.clear();
        let mut map = self
            .locks
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Forget locks nobody else is holding or waiting on.
        for name in &self.names {
            if map.get(name).is_some_and(|m| Arc::strong_count(m) == 1) {
                map.remove(name);
            }
        }
        tracing::debug!(tables = ?self.names, "table locks released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let locks = TableLocks::new();
        let guard = locks.acquire(["posts"]).await;
        assert!(locks.is_locked("posts"));
        assert!(!locks.is_locked("users"));
        drop(guard);
        assert!(!locks.is_locked("posts"));
        assert!(locks.inner.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_writer_waits() {
        let locks = TableLocks::new();
        let guard = locks.acquire(["posts", "articles"]).await;
        assert_eq!(guard.tables(), ["articles", "posts"]);

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(["posts"]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
