use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per key, created on first use. Holding the guard
/// serializes every read-decide-write sequence on that key. An entry is
/// removed when its last guard is released and nobody is waiting on it.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

/// Held lock on one key of a [`KeyedLocks`].
#[derive(Debug)]
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        // cloned under the shard lock, so release() cannot drop it meanwhile
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        KeyedGuard {
            owner: self,
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    // The map holds one reference; any other is a holder or a waiter
    fn release(&self, key: &K) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                tokio::spawn(async move {
                    let _guard = locks.lock(&7).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_dropped_after_release() {
        let locks = KeyedLocks::<u32>::new();

        for key in 0..100 {
            let _guard = locks.lock(&key).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());

        let first = locks.lock(&1).await;
        let other = locks.lock(&2).await;
        assert_eq!(locks.len(), 2);
        drop(first);
        assert_eq!(locks.len(), 1);
        drop(other);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_someone_waits() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let held = locks.lock(&3).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(&3).await;
            })
        };
        // let the waiter clone the mutex and park on it
        let refs = |locks: &KeyedLocks<u32>| {
            locks
                .locks
                .get(&3)
                .map(|lock| Arc::strong_count(lock.value()))
                .unwrap_or(0)
        };
        while refs(&locks) < 3 {
            tokio::task::yield_now().await;
        }

        drop(held);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
