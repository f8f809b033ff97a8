//! Keyed async locks
//!
//! One tokio mutex per key, created on first use and dropped again when the
//! last guard or waiter lets go of it. Multi-key acquisition sorts and
//! de-duplicates the keys so two commands touching the same pair of accounts
//! always lock in the same order.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::core_types::{AccountId, AccrualId, IbId, TransactionId};
use crate::error::LedgerError;

type Slots<K> = Arc<DashMap<K, Arc<Mutex<()>>>>;

/// Held lock on one key; releasing it prunes the slot if nobody waits on it
#[derive(Debug)]
pub struct KeyGuard<K: Eq + Hash> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    slots: Slots<K>,
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        // unlock first so our own guard no longer counts as a holder
        self.guard.take();
        // `slot()` clones under the same shard lock, so a new waiter either
        // sees the removal or keeps the count above one
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// Per-key mutex table
pub struct KeyedLocks<K> {
    name: &'static str,
    slots: Slots<K>,
    timeout: Duration,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone + Display,
{
    pub fn new(name: &'static str, timeout: Duration) -> Self {
        Self {
            name,
            slots: Arc::new(DashMap::new()),
            timeout,
        }
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        self.slots.entry(key.clone()).or_default().clone()
    }

    /// Lock one key, failing with `ConcurrencyConflict` after the timeout
    pub async fn acquire(&self, key: &K) -> Result<KeyGuard<K>, LedgerError> {
        let slot = self.slot(key);
        let locked = tokio::time::timeout(self.timeout, slot.lock_owned()).await;
        match locked {
            Ok(guard) => Ok(KeyGuard {
                guard: Some(guard),
                key: key.clone(),
                slots: self.slots.clone(),
            }),
            Err(_) => {
                self.slots
                    .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
                warn!(
                    lock = self.name,
                    key = %key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Lock acquisition timed out"
                );
                Err(LedgerError::ConcurrencyConflict(format!(
                    "{} {} is busy",
                    self.name, key
                )))
            }
        }
    }

    /// Lock several keys in ascending order
    pub async fn acquire_many(&self, keys: &[K]) -> Result<Vec<KeyGuard<K>>, LedgerError> {
        let mut ordered: Vec<K> = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            // Guards acquired so far are released on early return.
            guards.push(self.acquire(key).await?);
        }
        Ok(guards)
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Lock spaces used by the ledger
///
/// - accounts: balance checks + ledger writes for one account are serialized
/// - transactions: one approve/reject at a time per transaction
/// - ibs: accrual read-modify-write per introducing broker
/// - accruals: one payout at a time per accrual
pub struct LockManager {
    pub accounts: KeyedLocks<AccountId>,
    pub transactions: KeyedLocks<TransactionId>,
    pub ibs: KeyedLocks<IbId>,
    pub accruals: KeyedLocks<AccrualId>,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            accounts: KeyedLocks::new("account", timeout),
            transactions: KeyedLocks::new("transaction", timeout),
            ibs: KeyedLocks::new("ib", timeout),
            accruals: KeyedLocks::new("accrual", timeout),
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
