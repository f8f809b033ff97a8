//! Account aggregate - cached balance projection over the ledger
//!
//! The cache is the only shared mutable state. It is filled from
//! `sum_for_account` on a miss and afterwards moved only by
//! [`AccountAggregate::apply_delta`], which callers invoke after a
//! successful commit while still holding the per-account lock. Readers
//! therefore see either the pre-commit or the post-commit balance.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::models::{Account, AccountStatus, BalanceSnapshot};
use crate::core_types::AccountId;
use crate::error::{LedgerError, LedgerResult};
use crate::guard::LockManager;
use crate::money::checked_add;
use crate::store::LedgerStore;

pub struct AccountAggregate {
    store: Arc<dyn LedgerStore>,
    locks: Arc<LockManager>,
    balances: DashMap<AccountId, Decimal>,
    /// Floating P/L per account, pushed by the trading bridge
    floating_pnl: DashMap<AccountId, Decimal>,
}

impl AccountAggregate {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<LockManager>) -> Self {
        Self {
            store,
            locks,
            balances: DashMap::new(),
            floating_pnl: DashMap::new(),
        }
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Provision a new account (starts ACTIVE with a zero balance)
    pub async fn open_account(&self, account: Account) -> LedgerResult<Account> {
        self.store.insert_account(&account).await?;
        self.balances.insert(account.id, Decimal::ZERO);
        info!(
            account_id = %account.id,
            client_id = account.client_id,
            currency = %account.currency,
            account_type = %account.account_type,
            "Account opened"
        );
        Ok(account)
    }

    pub async fn account(&self, id: AccountId) -> LedgerResult<Account> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
    }

    /// KYC / back-office status change
    ///
    /// Serialized with money movement on the account, so an approval that
    /// checked ACTIVE commits before a suspension takes effect.
    pub async fn set_status(&self, id: AccountId, status: AccountStatus) -> LedgerResult<Account> {
        let _guard = self.locks.accounts.acquire(&id).await?;
        let account = self.store.update_account_status(id, status).await?;
        info!(account_id = %id, status = %status, "Account status changed");
        Ok(account)
    }

    // ========================================================================
    // Balances
    // ========================================================================

    /// Current balance (sum of committed entries)
    pub async fn get_balance(&self, id: AccountId) -> LedgerResult<Decimal> {
        if let Some(balance) = self.cached(id) {
            return Ok(balance);
        }
        let _guard = self.locks.accounts.acquire(&id).await?;
        self.locked_balance(id).await
    }

    /// Balance read for a caller that already holds the account lock
    pub(crate) async fn locked_balance(&self, id: AccountId) -> LedgerResult<Decimal> {
        if let Some(balance) = self.cached(id) {
            return Ok(balance);
        }
        // unknown accounts must not be cached as zero
        self.account(id).await?;
        let sum = self.store.sum_for_account(id).await?;
        self.balances.insert(id, sum);
        debug!(account_id = %id, balance = %sum, "Balance loaded from ledger");
        Ok(sum)
    }

    /// Move the cached balance by a committed delta
    ///
    /// Only called after `LedgerStore::append` succeeded, with the account
    /// lock held. On a cache miss the post-commit sum is loaded instead. An
    /// overflowing delta evicts the entry so the next read goes to the ledger.
    pub(crate) async fn apply_delta(&self, id: AccountId, delta: Decimal) -> LedgerResult<Decimal> {
        let moved = self
            .balances
            .get_mut(&id)
            .map(|mut balance| -> LedgerResult<Decimal> {
                *balance = checked_add(*balance, delta)?;
                Ok(*balance)
            });
        match moved {
            Some(Ok(balance)) => return Ok(balance),
            Some(Err(e)) => {
                self.balances.remove(&id);
                return Err(e);
            }
            None => {}
        }
        let sum = self.store.sum_for_account(id).await?;
        self.balances.insert(id, sum);
        Ok(sum)
    }

    /// Cached balance without touching storage
    pub fn cached(&self, id: AccountId) -> Option<Decimal> {
        self.balances.get(&id).map(|b| *b)
    }

    /// Balance + equity view
    pub async fn snapshot(&self, id: AccountId) -> LedgerResult<BalanceSnapshot> {
        let account = self.account(id).await?;
        let balance = self.get_balance(id).await?;
        let pnl = self.floating_pnl.get(&id).map(|p| *p).unwrap_or_default();
        Ok(BalanceSnapshot {
            account_id: id,
            balance,
            equity: checked_add(balance, pnl)?,
            currency: account.currency,
        })
    }

    /// Record the floating P/L of open positions (bridge input)
    pub async fn set_floating_pnl(&self, id: AccountId, pnl: Decimal) -> LedgerResult<BalanceSnapshot> {
        self.account(id).await?;
        self.floating_pnl.insert(id, pnl);
        debug!(account_id = %id, floating_pnl = %pnl, "Floating P/L updated");
        self.snapshot(id).await
    }

    /// Preload balances of every account
    pub async fn warm(&self) -> LedgerResult<usize> {
        let accounts = self.store.list_accounts().await?;
        for account in &accounts {
            let _guard = self.locks.accounts.acquire(&account.id).await?;
            self.locked_balance(account.id).await?;
        }
        info!(accounts = accounts.len(), "Balance cache warmed");
        Ok(accounts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::money::Currency;
    use crate::store::MemoryStore;

    fn aggregate() -> AccountAggregate {
        AccountAggregate::new(Arc::new(MemoryStore::new()), Arc::new(LockManager::default()))
    }

    fn usd_account(id: u64) -> Account {
        Account::new(AccountId(id), 1, AccountType::Live, Currency::USD, 100)
    }

    #[tokio::test]
    async fn test_new_account_has_zero_balance() {
        let agg = aggregate();
        agg.open_account(usd_account(1)).await.unwrap();
        assert_eq!(agg.get_balance(AccountId(1)).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let agg = aggregate();
        assert!(matches!(
            agg.get_balance(AccountId(42)).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(agg.cached(AccountId(42)).is_none());
    }

    #[tokio::test]
    async fn test_equity_includes_floating_pnl() {
        let agg = aggregate();
        agg.open_account(usd_account(1)).await.unwrap();
        agg.apply_delta(AccountId(1), Decimal::new(1000, 0)).await.unwrap();

        let snap = agg
            .set_floating_pnl(AccountId(1), Decimal::new(-250, 0))
            .await
            .unwrap();
        assert_eq!(snap.balance, Decimal::new(1000, 0));
        assert_eq!(snap.equity, Decimal::new(750, 0));
        assert_eq!(snap.currency, Currency::USD);
    }

    #[tokio::test]
    async fn test_set_status() {
        let agg = aggregate();
        agg.open_account(usd_account(1)).await.unwrap();
        let acc = agg
            .set_status(AccountId(1), AccountStatus::Suspended)
            .await
            .unwrap();
        assert!(!acc.is_active());
        assert!(agg.account(AccountId(1)).await.unwrap().ensure_active().is_err());
    }

    #[tokio::test]
    async fn test_overflowing_delta_is_an_error() {
        let agg = aggregate();
        agg.open_account(usd_account(1)).await.unwrap();
        agg.apply_delta(AccountId(1), Decimal::MAX).await.unwrap();

        assert!(matches!(
            agg.apply_delta(AccountId(1), Decimal::ONE).await,
            Err(LedgerError::Overflow(_))
        ));
        assert!(agg.cached(AccountId(1)).is_none());
    }
}
