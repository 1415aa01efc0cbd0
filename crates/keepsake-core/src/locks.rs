//! Per-id writer locks
//!
//! At most one logical writer per memory id. Multi-id operations acquire
//! their locks in sorted order so two merges can never deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard for one id; the lock is released on drop
pub type KeyGuard = OwnedMutexGuard<()>;

/// Entries are pruned once the table grows past this
const PRUNE_THRESHOLD: usize = 1024;

/// Table of async mutexes keyed by memory id
#[derive(Default)]
pub struct KeyedLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        // The table only maps ids to mutexes; a poisoned guard is still usable
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table.len() > PRUNE_THRESHOLD {
            // Only the table holds an unused entry
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(table.entry(key.to_string()).or_default())
    }

    /// Wait for exclusive access to one id
    pub async fn lock(&self, key: &str) -> KeyGuard {
        self.slot(key).lock_owned().await
    }

    /// Wait for exclusive access to several ids (deduplicated, sorted order)
    pub async fn lock_many<S: AsRef<str>>(&self, keys: &[S]) -> Vec<KeyGuard> {
        let mut sorted: Vec<&str> = keys.iter().map(|k| k.as_ref()).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of ids currently tracked
    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    /// Whether no ids are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("a").await;

        let other = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = other.lock("a").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_lock_many_dedups() {
        let locks = KeyedLocks::new();
        let guards = locks.lock_many(&["b", "a", "b"]).await;
        assert_eq!(guards.len(), 2);
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_opposite_orders_do_not_deadlock() {
        let locks = Arc::new(KeyedLocks::new());
        let l1 = Arc::clone(&locks);
        let l2 = Arc::clone(&locks);

        let t1 = tokio::spawn(async move {
            for _ in 0..50 {
                let _g = l1.lock_many(&["x", "y"]).await;
                tokio::task::yield_now().await;
            }
        });
        let t2 = tokio::spawn(async move {
            for _ in 0..50 {
                let _g = l2.lock_many(&["y", "x"]).await;
                tokio::task::yield_now().await;
            }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            t1.await.unwrap();
            t2.await.unwrap();
        })
        .await
        .unwrap();
    }
}
