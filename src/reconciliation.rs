//! Reconciliation Worker
//!
//! Recomputes every account balance from the ledger and compares it with the
//! cached projection, and checks that finalized transactions own the right
//! number of entries. Mismatches are operator alerts: logged at `error`
//! level and reported, never corrected here.
//!
//! Balances are re-summed on every sweep. The entry-count check only looks
//! at transactions updated since the previous sweep started, minus a small
//! overlap for commits that were stamped before that start but landed after.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::account::AccountAggregate;
use crate::core_types::{AccountId, TransactionId};
use crate::error::LedgerResult;
use crate::guard::LockManager;
use crate::store::LedgerStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub cached: Decimal,
    pub ledger: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryCountMismatch {
    pub transaction_id: TransactionId,
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub accounts_checked: usize,
    pub transactions_checked: usize,
    pub balance_mismatches: Vec<BalanceMismatch>,
    pub entry_mismatches: Vec<EntryCountMismatch>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.balance_mismatches.is_empty() && self.entry_mismatches.is_empty()
    }
}

/// Re-check window behind the previous sweep's start
pub const SWEEP_OVERLAP_SECS: i64 = 60;

pub struct ReconciliationWorker {
    store: Arc<dyn LedgerStore>,
    accounts: Arc<AccountAggregate>,
    locks: Arc<LockManager>,
    interval: Duration,
    overlap: TimeDelta,
    /// `since` for the next sweep's transaction check
    watermark: Mutex<DateTime<Utc>>,
}

impl ReconciliationWorker {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: Arc<AccountAggregate>,
        locks: Arc<LockManager>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            accounts,
            locks,
            interval,
            overlap: TimeDelta::seconds(SWEEP_OVERLAP_SECS),
            watermark: Mutex::new(DateTime::UNIX_EPOCH),
        }
    }

    pub fn with_overlap(mut self, overlap: TimeDelta) -> Self {
        self.overlap = overlap;
        self
    }

    pub async fn run(&self) -> ! {
        info!(interval_secs = self.interval.as_secs(), "Starting reconciliation worker");

        loop {
            tokio::time::sleep(self.interval).await;
            if let Err(e) = self.sweep().await {
                error!(error = %e, "Reconciliation sweep failed");
            }
        }
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        *self.watermark.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reconcile from the watermark and advance it on success
    ///
    /// A failed sweep leaves the watermark in place, so the next one covers
    /// the same transactions again.
    pub async fn sweep(&self) -> LedgerResult<ReconciliationReport> {
        let since = self.watermark();
        let started = Utc::now();
        let report = self.reconcile(since).await?;

        let next = (started - self.overlap).max(since);
        *self.watermark.lock().unwrap_or_else(PoisonError::into_inner) = next;
        debug!(since = %since, next = %next, "Reconciliation watermark advanced");
        Ok(report)
    }

    /// One sweep; transactions are checked if updated at or after `since`
    pub async fn reconcile(&self, since: DateTime<Utc>) -> LedgerResult<ReconciliationReport> {
        let mut report = ReconciliationReport::default();

        for account in self.store.list_accounts().await? {
            // Compare under the account lock so no commit lands between reads.
            let _guard = self.locks.accounts.acquire(&account.id).await?;
            report.accounts_checked += 1;

            let Some(cached) = self.accounts.cached(account.id) else {
                continue;
            };
            let ledger = self.store.sum_for_account(account.id).await?;
            if cached != ledger {
                error!(
                    account_id = %account.id,
                    cached = %cached,
                    ledger = %ledger,
                    "ALERT: balance projection diverges from ledger"
                );
                report.balance_mismatches.push(BalanceMismatch {
                    account_id: account.id,
                    cached,
                    ledger,
                });
            }
        }

        for txn in self.store.transactions_updated_since(since).await? {
            report.transactions_checked += 1;
            let found = self.store.entries_for_transaction(txn.id).await?.len();
            let expected = txn.expected_entry_count();
            if found != expected {
                error!(
                    transaction_id = %txn.id,
                    status = %txn.status,
                    expected,
                    found,
                    "ALERT: transaction entry count mismatch"
                );
                report.entry_mismatches.push(EntryCountMismatch {
                    transaction_id: txn.id,
                    expected,
                    found,
                });
            }
        }

        if report.is_clean() {
            debug!(
                accounts = report.accounts_checked,
                transactions = report.transactions_checked,
                "Reconciliation clean"
            );
        } else {
            error!(
                balance_mismatches = report.balance_mismatches.len(),
                entry_mismatches = report.entry_mismatches.len(),
                "Reconciliation found mismatches"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, AccountType};
    use crate::ledger::{CommitBatch, TransactionWrite};
    use crate::money::Currency;
    use crate::store::MemoryStore;
    use crate::transaction::{Finalization, Transaction, TransactionLegs, TransactionStatus};

    #[tokio::test]
    async fn test_detects_write_that_bypassed_the_aggregate() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockManager::default());
        let accounts = Arc::new(AccountAggregate::new(store.clone(), locks.clone()));
        accounts
            .open_account(Account::new(AccountId(1), 1, AccountType::Live, Currency::USD, 100))
            .await
            .unwrap();
        let worker = ReconciliationWorker::new(
            store.clone(),
            accounts.clone(),
            locks,
            Duration::from_secs(60),
        );
        assert!(worker.reconcile(DateTime::UNIX_EPOCH).await.unwrap().is_clean());

        // Commit straight to the store: the cache still says zero.
        let mut txn = Transaction::pending(
            TransactionLegs::Deposit { account: AccountId(1) },
            Decimal::new(10, 0),
            Currency::USD,
            "manual",
            None,
        );
        txn.finalize(&Finalization::completed("ops", "manual-1", Utc::now()));
        let entries = txn.legs.entries(txn.amount, txn.currency, txn.id, Utc::now());
        store
            .append(CommitBatch::new(entries, TransactionWrite::Insert(txn)))
            .await
            .unwrap();

        let report = worker.reconcile(DateTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(report.balance_mismatches.len(), 1);
        assert_eq!(report.balance_mismatches[0].ledger, Decimal::new(10, 0));
        assert!(report.entry_mismatches.is_empty());

        // reported, not corrected
        assert_eq!(accounts.cached(AccountId(1)), Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_detects_completed_transaction_without_entries() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockManager::default());
        let accounts = Arc::new(AccountAggregate::new(store.clone(), locks.clone()));
        accounts
            .open_account(Account::new(AccountId(1), 1, AccountType::Live, Currency::USD, 100))
            .await
            .unwrap();

        let mut txn = Transaction::pending(
            TransactionLegs::Deposit { account: AccountId(1) },
            Decimal::new(10, 0),
            Currency::USD,
            "manual",
            None,
        );
        txn.status = TransactionStatus::Completed;
        store.insert_transaction(&txn).await.unwrap();

        let worker = ReconciliationWorker::new(store, accounts, locks, Duration::from_secs(60));
        let report = worker.reconcile(DateTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(
            report.entry_mismatches,
            vec![EntryCountMismatch {
                transaction_id: txn.id,
                expected: 1,
                found: 0,
            }]
        );
    }

    #[tokio::test]
    async fn test_sweep_checks_only_transactions_since_the_last_one() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockManager::default());
        let accounts = Arc::new(AccountAggregate::new(store.clone(), locks.clone()));
        accounts
            .open_account(Account::new(AccountId(1), 1, AccountType::Live, Currency::USD, 100))
            .await
            .unwrap();
        let worker = ReconciliationWorker::new(store.clone(), accounts, locks, Duration::from_secs(60))
            .with_overlap(TimeDelta::zero());

        let deposit = || {
            Transaction::pending(
                TransactionLegs::Deposit { account: AccountId(1) },
                Decimal::new(10, 0),
                Currency::USD,
                "manual",
                None,
            )
        };
        store.insert_transaction(&deposit()).await.unwrap();

        assert_eq!(worker.watermark(), DateTime::UNIX_EPOCH);
        assert_eq!(worker.sweep().await.unwrap().transactions_checked, 1);
        assert!(worker.watermark() > DateTime::UNIX_EPOCH);
        assert_eq!(worker.sweep().await.unwrap().transactions_checked, 0);

        store.insert_transaction(&deposit()).await.unwrap();
        let report = worker.sweep().await.unwrap();
        assert_eq!(report.transactions_checked, 1);
        assert_eq!(report.accounts_checked, 1);
    }

    #[tokio::test]
    async fn test_overlap_rechecks_recent_transactions() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockManager::default());
        let accounts = Arc::new(AccountAggregate::new(store.clone(), locks.clone()));
        let worker = ReconciliationWorker::new(store.clone(), accounts, locks, Duration::from_secs(60));

        let txn = Transaction::pending(
            TransactionLegs::Deposit { account: AccountId(1) },
            Decimal::new(10, 0),
            Currency::USD,
            "manual",
            None,
        );
        store.insert_transaction(&txn).await.unwrap();

        assert_eq!(worker.sweep().await.unwrap().transactions_checked, 1);
        assert_eq!(worker.sweep().await.unwrap().transactions_checked, 1);
    }
}
