//! Keyed async mutual exclusion
//!
//! One `tokio::sync::Mutex` per key, created on demand and dropped once no
//! task holds or awaits it.

use crate::error::{LedgerError, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard for a single key; the key unlocks when dropped
pub type KeyGuard = OwnedMutexGuard<()>;

/// Map of async locks keyed by `K`
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &K) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| LedgerError::InternalError {
            message: "Failed to acquire keyed lock table".to_string(),
        })?;

        // Only the table holds these: nobody is inside or waiting
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &K) -> Result<KeyGuard> {
        let handle = self.handle(key)?;
        Ok(handle.lock_owned().await)
    }

    /// Lock several keys in ascending order, skipping duplicates.
    ///
    /// Every caller acquires in the same global order, so two tasks locking
    /// overlapping sets cannot deadlock.
    pub async fn lock_all(&self, keys: &[K]) -> Result<Vec<KeyGuard>> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            guards.push(self.lock(key).await?);
        }
        Ok(guards)
    }

    /// Number of keys with a live lock
    pub fn active_keys(&self) -> Result<usize> {
        let locks = self.locks.lock().map_err(|_| LedgerError::InternalError {
            message: "Failed to acquire keyed lock table".to_string(),
        })?;
        Ok(locks
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::<u64>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    let _guard = locks.lock(&1).await.unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::<u64>::new();
        let _first = locks.lock(&1).await.unwrap();

        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(&2)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_lock_all_dedups_and_releases() {
        let locks = KeyedLocks::<i64>::new();
        {
            let guards = locks.lock_all(&[5, 3, 5]).await.unwrap();
            assert_eq!(guards.len(), 2);
            assert_eq!(locks.active_keys().unwrap(), 2);
        }
        assert_eq!(locks.active_keys().unwrap(), 0);

        // Opposite orders still complete
        let a = locks.lock_all(&[1, 2]).await.unwrap();
        drop(a);
        let b = locks.lock_all(&[2, 1]).await.unwrap();
        assert_eq!(b.len(), 2);
    }
}
