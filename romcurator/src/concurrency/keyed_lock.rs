//! Per-key mutual exclusion with bounded memory.
//!
//! A [`KeyedLock`] hands out one async mutex per key. The lock table itself is
//! guarded by a short-lived synchronous mutex that is never held across an
//! `.await`, so creating a key's lock is atomic with respect to a concurrent
//! first use of the same key.
//!
//! # Multiple keys
//!
//! Keys are deduplicated and sorted before any lock is taken. Every caller
//! therefore acquires overlapping key sets in the same global order, which
//! rules out lock-order inversion between two multi-key acquisitions.
//!
//! # Eviction
//!
//! With a `max_size`, the table evicts least-recently-used keys after a new
//! key is created, until it is back to `max_size` entries. A key is only
//! evictable when nobody holds or awaits its lock: a waiter keeps a clone of
//! the lock's `Arc`, so a strong count above one means "in use".

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// A lock table entry.
struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    last_used: u64,
}

impl LockEntry {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.lock) > 1
    }
}

/// Lock table state, only touched while the table mutex is held.
struct LockTable<K> {
    entries: HashMap<K, LockEntry>,
    /// Recency order: tick → key, oldest first.
    recency: BTreeMap<u64, K>,
    tick: u64,
}

impl<K> LockTable<K>
where
    K: Clone + Eq + Hash,
{
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    /// Returns the lock for `key`, creating it if needed, and marks the key
    /// as most recently used. The boolean is `true` if the lock is new.
    fn checkout(&mut self, key: &K) -> (Arc<AsyncMutex<()>>, bool) {
        self.tick += 1;
        let tick = self.tick;

        match self.entries.get_mut(key) {
            Some(entry) => {
                self.recency.remove(&entry.last_used);
                entry.last_used = tick;
                self.recency.insert(tick, key.clone());
                (Arc::clone(&entry.lock), false)
            }
            None => {
                let lock = Arc::new(AsyncMutex::new(()));
                self.entries.insert(
                    key.clone(),
                    LockEntry {
                        lock: Arc::clone(&lock),
                        last_used: tick,
                    },
                );
                self.recency.insert(tick, key.clone());
                (lock, true)
            }
        }
    }

    /// Evicts idle keys, oldest first, until at most `max_size` remain.
    ///
    /// Keys in use are skipped and stay where they are, so the table may
    /// stay above `max_size` while many locks are held.
    fn evict_idle(&mut self, max_size: usize) -> usize {
        if self.entries.len() <= max_size {
            return 0;
        }

        let excess = self.entries.len() - max_size;
        let victims: Vec<(u64, K)> = self
            .recency
            .iter()
            .filter(|(_, key)| self.entries.get(*key).is_some_and(|entry| !entry.in_use()))
            .take(excess)
            .map(|(tick, key)| (*tick, key.clone()))
            .collect();

        for (tick, key) in &victims {
            self.recency.remove(tick);
            self.entries.remove(key);
        }

        victims.len()
    }
}

/// Runs code exclusively per key.
///
/// # Example
///
/// ```ignore
/// let locks = KeyedLock::with_max_size(1000);
/// locks
///     .run_exclusive_for_keys(["out/a.rom".to_string(), "out/b.rom".to_string()], || async {
///         // nobody else is writing either path
///     })
///     .await;
/// ```
pub struct KeyedLock<K = String> {
    table: Mutex<LockTable<K>>,
    max_size: Option<usize>,
    locks_created: AtomicU64,
}

impl<K> KeyedLock<K>
where
    K: Clone + Ord + Hash + Send + Sync + 'static,
{
    /// Creates an unbounded keyed lock.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::new()),
            max_size: None,
            locks_created: AtomicU64::new(0),
        }
    }

    /// Creates a keyed lock that keeps at most `max_size` idle keys.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size),
            ..Self::new()
        }
    }

    /// Acquires the lock for a single key.
    pub async fn acquire_one(&self, key: K) -> KeyedLockGuard {
        self.acquire([key]).await
    }

    /// Acquires the lock for every given key.
    ///
    /// Suspends until all of them are held. Keys are deduplicated and taken
    /// in sorted order. An empty key set returns immediately.
    pub async fn acquire<I>(&self, keys: I) -> KeyedLockGuard
    where
        I: IntoIterator<Item = K>,
    {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        if keys.is_empty() {
            return KeyedLockGuard { guards: Vec::new() };
        }

        let locks = {
            let mut table = self.table.lock();
            let mut created = 0u64;
            let locks: Vec<Arc<AsyncMutex<()>>> = keys
                .iter()
                .map(|key| {
                    let (lock, is_new) = table.checkout(key);
                    if is_new {
                        created += 1;
                    }
                    lock
                })
                .collect();

            if created > 0 {
                self.locks_created.fetch_add(created, Ordering::Relaxed);
                if let Some(max_size) = self.max_size {
                    let evicted = table.evict_idle(max_size);
                    if evicted > 0 {
                        trace!(evicted, remaining = table.entries.len(), "Evicted idle lock keys");
                    }
                }
            }

            locks
        };

        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }

        KeyedLockGuard { guards }
    }

    /// Runs `body` while holding the lock for `key`.
    pub async fn run_exclusive_for_key<F, Fut, T>(&self, key: K, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire_one(key).await;
        body().await
    }

    /// Runs `body` while holding the locks for every key in `keys`.
    pub async fn run_exclusive_for_keys<I, F, Fut, T>(&self, keys: I, body: F) -> T
    where
        I: IntoIterator<Item = K>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(keys).await;
        body().await
    }

    /// Returns `true` if `key` is tracked and currently held by someone.
    pub fn is_locked(&self, key: &K) -> bool {
        self.table
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.lock.try_lock().is_err())
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Returns `true` if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of per-key locks created so far.
    ///
    /// Re-acquiring an evicted key creates a fresh lock and bumps this.
    pub fn locks_created(&self) -> u64 {
        self.locks_created.load(Ordering::Relaxed)
    }

    /// The configured bound on idle keys, if any.
    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }
}

impl<K> Default for KeyedLock<K>
where
    K: Clone + Ord + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for KeyedLock<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLock")
            .field("keys", &self.table.lock().entries.len())
            .field("max_size", &self.max_size)
            .field("locks_created", &self.locks_created.load(Ordering::Relaxed))
            .finish()
    }
}

/// Holds the locks for a key set. Released on drop.
#[must_use = "the locks are released as soon as the guard is dropped"]
pub struct KeyedLockGuard {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLockGuard {
    /// Number of distinct keys held.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Returns `true` if no keys are held.
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Releases every held lock now.
    pub fn release(self) {
        drop(self);
    }
}
