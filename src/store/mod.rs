//! Ledger storage
//!
//! [`LedgerStore`] is the durability seam. Every backend must apply a
//! [`CommitBatch`] as one all-or-nothing unit: entries, the governing
//! transaction write and (for payouts) the accrual settlement become
//! visible together or not at all.
//!
//! Backends:
//! - [`MemoryStore`]: single `RwLock`ed state, failure injection for tests
//! - [`PgStore`]: PostgreSQL via `sqlx`, one SQL transaction per batch

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::account::{Account, AccountStatus};
use crate::commission::{CommissionAccrual, IbProfile, Period};
use crate::core_types::{AccountId, AccrualId, IbId, TransactionId};
use crate::error::LedgerResult;
use crate::ledger::{CommitBatch, Committed, EntryKind, LedgerEntry};
use crate::money::Currency;
use crate::transaction::{Finalization, Transaction, TransactionStatus};

/// Storage backend for accounts, transactions, ledger entries and accruals
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Insert a new account; an existing id is a `Validation` error
    async fn insert_account(&self, account: &Account) -> LedgerResult<()>;

    async fn get_account(&self, id: AccountId) -> LedgerResult<Option<Account>>;

    /// Change account status, returning the updated record
    async fn update_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> LedgerResult<Account>;

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>>;

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    async fn insert_transaction(&self, txn: &Transaction) -> LedgerResult<()>;

    async fn get_transaction(&self, id: TransactionId) -> LedgerResult<Option<Transaction>>;

    /// Atomic CAS: set `new` only if the current status is `expected`
    ///
    /// Returns true if the update happened.
    async fn update_status_if(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
    ) -> LedgerResult<bool>;

    /// Atomic CAS finalization without ledger entries (rejection)
    ///
    /// Returns the finalized transaction, or `None` if the status no longer
    /// matched `expected`.
    async fn finalize_if(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        finalization: &Finalization,
    ) -> LedgerResult<Option<Transaction>>;

    /// Transactions created or updated at or after `since`
    async fn transactions_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Sum of PENDING/PROCESSING withdrawal amounts funded by `account`
    async fn pending_debits(
        &self,
        account: AccountId,
        exclude: Option<TransactionId>,
    ) -> LedgerResult<Decimal>;

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    /// Commit a batch atomically
    ///
    /// Fails with `InsufficientFunds` if an account listed in
    /// `batch.no_overdraft` would end below zero, `InvalidState` if the
    /// transaction CAS misses, `AlreadyPaid` if the settled accrual is
    /// already paid, `Storage` on durability failure. Nothing is written
    /// on any failure.
    async fn append(&self, batch: CommitBatch) -> LedgerResult<Committed>;

    /// Committed balance: sum of committed entry amounts
    async fn sum_for_account(&self, account: AccountId) -> LedgerResult<Decimal>;

    /// Committed entries of an account, in commit order
    async fn entries_for_account(&self, account: AccountId) -> LedgerResult<Vec<LedgerEntry>>;

    async fn entries_for_transaction(&self, id: TransactionId) -> LedgerResult<Vec<LedgerEntry>>;

    /// Absolute sum of committed `kind` debits on `account` since `since`
    async fn debited_since(
        &self,
        account: AccountId,
        kind: EntryKind,
        since: DateTime<Utc>,
    ) -> LedgerResult<Decimal>;

    // ------------------------------------------------------------------
    // Commission
    // ------------------------------------------------------------------

    /// Register or re-point an IB profile
    async fn upsert_ib(&self, profile: &IbProfile) -> LedgerResult<()>;

    async fn get_ib(&self, ib: IbId) -> LedgerResult<Option<IbProfile>>;

    /// Referred volume recorded for `ib` at or after `since`
    async fn volume_since(&self, ib: IbId, since: DateTime<Utc>) -> LedgerResult<Decimal>;

    /// Record a volume sample and add `commission` to the open accrual of
    /// `(ib, period)` as one atomic unit; opens the accrual if needed
    async fn record_accrual(
        &self,
        ib: IbId,
        period: Period,
        currency: Currency,
        volume: Decimal,
        commission: Decimal,
        at: DateTime<Utc>,
    ) -> LedgerResult<CommissionAccrual>;

    async fn get_accrual(&self, id: AccrualId) -> LedgerResult<Option<CommissionAccrual>>;

    async fn unpaid_accruals(&self) -> LedgerResult<Vec<CommissionAccrual>>;
}
