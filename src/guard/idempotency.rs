//! Idempotency guard
//!
//! Records `key -> result` on the first successful execution of a mutating
//! command. A repeated call with the same key returns the recorded result
//! without re-running side effects. The finalizing key is also persisted on
//! the transaction / accrual itself, so an evicted or restarted cache loses
//! only the fast path, never the guarantee.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use cached::{Cached, TimedSizedCache};

/// Entries kept before the least recently used one is evicted
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Seconds a recorded result stays replayable from memory
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default key for an action: `"{target_id}:{TARGET_STATUS}"`
///
/// The admin UI issues one request per click, so the target id plus the
/// status it asks for identifies the action.
pub fn derive_key(target_id: impl Display, target_status: impl Display) -> String {
    format!("{}:{}", target_id, target_status)
}

/// Bounded in-memory result cache keyed by idempotency key
pub struct IdempotencyGuard<K, V> {
    results: Mutex<TimedSizedCache<K, V>>,
}

impl<K, V> IdempotencyGuard<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// `capacity` must be non-zero
    pub fn with_capacity(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            results: Mutex::new(TimedSizedCache::with_size_and_lifespan(
                capacity.max(1),
                ttl_secs,
            )),
        }
    }

    // A panic while holding the lock cannot leave the cache half-written.
    fn results(&self) -> MutexGuard<'_, TimedSizedCache<K, V>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached result for `key`, if the action already succeeded
    pub fn get(&self, key: &K) -> Option<V> {
        self.results().cache_get(key).cloned()
    }

    /// Record the result of the first success; an existing record wins
    pub fn record(&self, key: K, value: V) -> V {
        let mut results = self.results();
        if let Some(existing) = results.cache_get(&key) {
            return existing.clone();
        }
        results.cache_set(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.results().cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for IdempotencyGuard<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
