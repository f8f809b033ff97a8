//! In-memory ledger store
//!
//! All state sits behind one `RwLock`, so a batch is applied while no
//! reader can observe it half-written. The lock is never held across an
//! await point.
//!
//! Failure injection (`set_fail_append`, `set_fail_mid_batch`) lets tests
//! exercise the all-or-nothing contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use super::LedgerStore;
use crate::account::{Account, AccountStatus};
use crate::commission::{CommissionAccrual, IbProfile, Period, VolumeSample};
use crate::core_types::{AccountId, AccrualId, IbId, TransactionId};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{CommitBatch, Committed, EntryKind, LedgerEntry, TransactionWrite};
use crate::money::{Currency, checked_add, checked_sum};
use crate::transaction::{Finalization, Transaction, TransactionKind, TransactionStatus};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
    /// Commit order
    entries: Vec<LedgerEntry>,
    /// Positions in `entries` per transaction
    entries_by_txn: HashMap<TransactionId, Vec<usize>>,
    ibs: HashMap<IbId, IbProfile>,
    volume: Vec<VolumeSample>,
    accruals: HashMap<AccrualId, CommissionAccrual>,
}

impl Inner {
    fn balance(&self, account: AccountId) -> LedgerResult<Decimal> {
        Ok(checked_sum(
            self.entries
                .iter()
                .filter(|e| e.committed && e.account_id == account)
                .map(|e| e.amount),
        )?)
    }

    fn cas_target(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
    ) -> LedgerResult<&Transaction> {
        let current = self
            .transactions
            .get(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;
        if current.status != expected {
            return Err(if current.status.is_terminal() {
                LedgerError::already_finalized(id, current.status)
            } else {
                LedgerError::InvalidState(format!(
                    "transaction {} is {}, expected {}",
                    id, current.status, expected
                ))
            });
        }
        Ok(current)
    }
}

/// In-memory [`LedgerStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_append: AtomicBool,
    fail_mid_batch: AtomicBool,
    appends: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `append` fail with `Storage` before writing anything
    pub fn set_fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    /// Make `append` fail after the first entry has been written
    ///
    /// The partial write is rolled back before the error is returned.
    pub fn set_fail_mid_batch(&self, fail: bool) {
        self.fail_mid_batch.store(fail, Ordering::SeqCst);
    }

    /// Number of successful appends
    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    /// Number of stored entries, committed or not
    pub fn entry_count(&self) -> usize {
        self.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| LedgerError::Storage("memory store lock poisoned".into()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| LedgerError::Storage("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert_account(&self, account: &Account) -> LedgerResult<()> {
        let mut inner = self.write()?;
        if inner.accounts.contains_key(&account.id) {
            return Err(LedgerError::Validation(format!(
                "account {} already exists",
                account.id
            )));
        }
        inner.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> LedgerResult<Option<Account>> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    async fn update_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> LedgerResult<Account> {
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))?;
        account.status = status;
        Ok(account.clone())
    }

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.read()?.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }

    async fn insert_transaction(&self, txn: &Transaction) -> LedgerResult<()> {
        let mut inner = self.write()?;
        if inner.transactions.contains_key(&txn.id) {
            return Err(LedgerError::Validation(format!(
                "transaction {} already exists",
                txn.id
            )));
        }
        inner.transactions.insert(txn.id, txn.clone());
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> LedgerResult<Option<Transaction>> {
        Ok(self.read()?.transactions.get(&id).cloned())
    }

    async fn update_status_if(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
    ) -> LedgerResult<bool> {
        let mut inner = self.write()?;
        match inner.transactions.get_mut(&id) {
            Some(txn) if txn.status == expected => {
                txn.status = new;
                txn.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(LedgerError::NotFound(format!("transaction {}", id))),
        }
    }

    async fn finalize_if(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        finalization: &Finalization,
    ) -> LedgerResult<Option<Transaction>> {
        let mut inner = self.write()?;
        match inner.transactions.get_mut(&id) {
            Some(txn) if txn.status == expected => {
                txn.finalize(finalization);
                Ok(Some(txn.clone()))
            }
            Some(_) => Ok(None),
            None => Err(LedgerError::NotFound(format!("transaction {}", id))),
        }
    }

    async fn transactions_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut txns: Vec<Transaction> = self
            .read()?
            .transactions
            .values()
            .filter(|t| t.updated_at >= since)
            .cloned()
            .collect();
        txns.sort_by_key(|t| t.id);
        Ok(txns)
    }

    async fn pending_debits(
        &self,
        account: AccountId,
        exclude: Option<TransactionId>,
    ) -> LedgerResult<Decimal> {
        let inner = self.read()?;
        Ok(checked_sum(
            inner
                .transactions
                .values()
                .filter(|t| {
                    t.kind() == TransactionKind::Withdrawal
                        && !t.status.is_terminal()
                        && t.legs.funding_account() == Some(account)
                        && Some(t.id) != exclude
                })
                .map(|t| t.amount),
        )?)
    }

    async fn append(&self, batch: CommitBatch) -> LedgerResult<Committed> {
        batch.validate()?;
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("injected append failure".into()));
        }

        let mut inner = self.write()?;

        // Pre-checks: nothing below may fail once writing starts.
        if let Some(entry) = batch
            .entries
            .iter()
            .find(|e| !inner.accounts.contains_key(&e.account_id))
        {
            return Err(LedgerError::NotFound(format!("account {}", entry.account_id)));
        }

        let transaction = match &batch.transaction {
            TransactionWrite::Finalize {
                id,
                expected,
                finalization,
            } => {
                let mut txn = inner.cas_target(*id, *expected)?.clone();
                txn.finalize(finalization);
                txn
            }
            TransactionWrite::Insert(txn) => {
                if inner.transactions.contains_key(&txn.id) {
                    return Err(LedgerError::Validation(format!(
                        "transaction {} already exists",
                        txn.id
                    )));
                }
                txn.clone()
            }
        };

        let deltas = batch.deltas();
        for (account, delta) in &deltas {
            let balance = inner.balance(*account)?;
            let after = checked_add(balance, *delta)?;
            if after < Decimal::ZERO && batch.no_overdraft.contains(account) {
                return Err(LedgerError::InsufficientFunds {
                    account: account.0,
                    available: balance,
                    requested: -*delta,
                });
            }
        }

        if let Some(settlement) = &batch.settle_accrual {
            let accrual = inner.accruals.get(&settlement.accrual_id).ok_or_else(|| {
                LedgerError::NotFound(format!("accrual {}", settlement.accrual_id))
            })?;
            if accrual.paid {
                return Err(LedgerError::AlreadyPaid(format!(
                    "accrual {} was paid at {}",
                    accrual.id,
                    accrual.paid_at.map(|t| t.to_rfc3339()).unwrap_or_default()
                )));
            }
            if accrual.amount != settlement.expected_amount {
                return Err(LedgerError::ConcurrencyConflict(format!(
                    "accrual {} is {} but the payout was built for {}",
                    accrual.id, accrual.amount, settlement.expected_amount
                )));
            }
        }

        // Write phase
        let mark = inner.entries.len();
        let total = batch.entries.len();
        let mut committed = Vec::with_capacity(total);
        for mut entry in batch.entries {
            entry.committed = true;
            inner.entries.push(entry.clone());
            committed.push(entry);

            if self.fail_mid_batch.load(Ordering::SeqCst) {
                inner.entries.truncate(mark);
                return Err(LedgerError::Storage(format!(
                    "injected failure after {} of {} entries",
                    committed.len(),
                    total
                )));
            }
        }

        let written = mark..inner.entries.len();
        inner
            .entries_by_txn
            .entry(transaction.id)
            .or_default()
            .extend(written);
        inner.transactions.insert(transaction.id, transaction.clone());

        if let Some(settlement) = batch.settle_accrual
            && let Some(accrual) = inner.accruals.get_mut(&settlement.accrual_id)
        {
            accrual.paid = true;
            accrual.paid_at = Some(settlement.paid_at);
            accrual.payout_transaction_id = Some(settlement.transaction_id);
            accrual.payout_key = Some(settlement.idempotency_key);
            accrual.updated_at = settlement.paid_at;
        }

        self.appends.fetch_add(1, Ordering::SeqCst);
        debug!(
            transaction_id = %transaction.id,
            entries = committed.len(),
            "Ledger batch committed"
        );

        Ok(Committed {
            transaction,
            entries: committed,
        })
    }

    async fn sum_for_account(&self, account: AccountId) -> LedgerResult<Decimal> {
        self.read()?.balance(account)
    }

    async fn entries_for_account(&self, account: AccountId) -> LedgerResult<Vec<LedgerEntry>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .filter(|e| e.committed && e.account_id == account)
            .cloned()
            .collect())
    }

    async fn entries_for_transaction(&self, id: TransactionId) -> LedgerResult<Vec<LedgerEntry>> {
        let inner = self.read()?;
        let Some(positions) = inner.entries_by_txn.get(&id) else {
            return Ok(Vec::new());
        };
        Ok(positions
            .iter()
            .filter_map(|&i| inner.entries.get(i))
            .filter(|e| e.committed)
            .cloned()
            .collect())
    }

    async fn debited_since(
        &self,
        account: AccountId,
        kind: EntryKind,
        since: DateTime<Utc>,
    ) -> LedgerResult<Decimal> {
        let inner = self.read()?;
        let sum = checked_sum(
            inner
                .entries
                .iter()
                .filter(|e| {
                    e.committed
                        && e.account_id == account
                        && e.kind == kind
                        && e.created_at >= since
                        && e.amount.is_sign_negative()
                })
                .map(|e| e.amount),
        )?;
        Ok(sum.abs())
    }

    async fn upsert_ib(&self, profile: &IbProfile) -> LedgerResult<()> {
        self.write()?.ibs.insert(profile.ib_id, profile.clone());
        Ok(())
    }

    async fn get_ib(&self, ib: IbId) -> LedgerResult<Option<IbProfile>> {
        Ok(self.read()?.ibs.get(&ib).cloned())
    }

    async fn volume_since(&self, ib: IbId, since: DateTime<Utc>) -> LedgerResult<Decimal> {
        let inner = self.read()?;
        Ok(checked_sum(
            inner
                .volume
                .iter()
                .filter(|s| s.ib_id == ib && s.recorded_at >= since)
                .map(|s| s.volume),
        )?)
    }

    async fn record_accrual(
        &self,
        ib: IbId,
        period: Period,
        currency: Currency,
        volume: Decimal,
        commission: Decimal,
        at: DateTime<Utc>,
    ) -> LedgerResult<CommissionAccrual> {
        let mut inner = self.write()?;

        let open = inner
            .accruals
            .values()
            .find(|a| a.ib_id == ib && a.period == period && !a.paid)
            .map(|a| a.id);
        let id = match open {
            Some(id) => id,
            None => {
                let accrual = CommissionAccrual::open(ib, period, currency);
                let id = accrual.id;
                inner.accruals.insert(id, accrual);
                id
            }
        };

        let accrual = inner
            .accruals
            .get_mut(&id)
            .ok_or_else(|| LedgerError::Storage(format!("accrual {} vanished", id)))?;
        accrual.amount = checked_add(accrual.amount, commission)?;
        accrual.updated_at = at;
        let accrual = accrual.clone();

        inner.volume.push(VolumeSample {
            ib_id: ib,
            volume,
            recorded_at: at,
        });
        Ok(accrual)
    }

    async fn get_accrual(&self, id: AccrualId) -> LedgerResult<Option<CommissionAccrual>> {
        Ok(self.read()?.accruals.get(&id).cloned())
    }

    async fn unpaid_accruals(&self) -> LedgerResult<Vec<CommissionAccrual>> {
        let mut accruals: Vec<CommissionAccrual> = self
            .read()?
            .accruals
            .values()
            .filter(|a| !a.paid)
            .cloned()
            .collect();
        accruals.sort_by(|a, b| a.period.cmp(&b.period).then(a.id.cmp(&b.id)));
        Ok(accruals)
    }
}
