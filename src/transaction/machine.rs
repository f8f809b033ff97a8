//! Transaction state machine
//!
//! Drives PENDING → PROCESSING → COMPLETED and PENDING/PROCESSING → REJECTED.
//!
//! Lock order: transaction lock first, then the sorted account locks. The
//! account locks are held from the funds check until the aggregate has
//! absorbed the committed deltas, so no other command can observe or spend
//! the same balance in between.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::limits::{LimitPolicy, day_start};
use super::state::TransactionStatus;
use super::types::{
    Finalization, Transaction, TransactionKind, TransactionLegs, TransactionRequest,
};
use crate::account::AccountAggregate;
use crate::core_types::{AccountId, TransactionId};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBus, TransitionEvent};
use crate::guard::{IdempotencyGuard, LockManager, derive_key};
use crate::ledger::{CommitBatch, EntryKind, LedgerEntry, TransactionWrite};
use crate::money::{Currency, validate_amount};
use crate::store::LedgerStore;

/// Result of a successful approval
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub transaction: Transaction,
    pub committed_entries: Vec<LedgerEntry>,
}

type ActionKey = (TransactionId, String);

pub struct TransactionStateMachine {
    store: Arc<dyn LedgerStore>,
    accounts: Arc<AccountAggregate>,
    locks: Arc<LockManager>,
    events: EventBus,
    limits: LimitPolicy,
    approvals: IdempotencyGuard<ActionKey, Approval>,
    rejections: IdempotencyGuard<ActionKey, Transaction>,
}

impl TransactionStateMachine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: Arc<AccountAggregate>,
        locks: Arc<LockManager>,
        events: EventBus,
        limits: LimitPolicy,
    ) -> Self {
        Self {
            store,
            accounts,
            locks,
            events,
            limits,
            approvals: IdempotencyGuard::new(),
            rejections: IdempotencyGuard::new(),
        }
    }

    pub fn limits(&self) -> &LimitPolicy {
        &self.limits
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Record a PENDING transaction; writes no ledger entries
    pub async fn create_pending(&self, request: TransactionRequest) -> LedgerResult<Transaction> {
        let legs =
            TransactionLegs::from_request(request.kind, request.from_account, request.to_account)?;

        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }
        if request.method.trim().is_empty() {
            return Err(LedgerError::Validation("payment method is required".into()));
        }

        let currency = self.eligible_currency(&legs).await?;
        let amount = validate_amount(request.amount, currency)?;
        self.limits.check_maximum(amount)?;
        self.limits.check_minimum(legs.kind(), amount)?;

        let txn = Transaction::pending(legs, amount, currency, request.method, request.details);

        match legs.funding_account() {
            Some(funding) => {
                // Hold the funding account so the balance check and the insert
                // are one step with respect to other requests on it.
                let _guard = self.locks.accounts.acquire(&funding).await?;
                let available = self.available(funding, None).await?;
                if amount > available {
                    return Err(LedgerError::Validation(format!(
                        "amount {} exceeds available balance {} of account {}",
                        amount, available, funding
                    )));
                }
                if legs.kind() == TransactionKind::Withdrawal {
                    self.check_daily_cap(funding, amount).await?;
                }
                self.store.insert_transaction(&txn).await?;
            }
            None => self.store.insert_transaction(&txn).await?,
        }

        info!(
            transaction_id = %txn.id,
            kind = %txn.kind(),
            accounts = ?txn.legs.accounts(),
            amount = %txn.amount,
            currency = %txn.currency,
            "Transaction created"
        );
        self.events.publish(TransitionEvent::for_transaction(&txn, None));
        Ok(txn)
    }

    // ========================================================================
    // Approve
    // ========================================================================

    /// Approve and commit a transaction
    ///
    /// `key` defaults to `"{id}:COMPLETED"`. Repeating a successful approval
    /// with the same key returns the original result without new entries.
    pub async fn approve(
        &self,
        id: TransactionId,
        actor_id: &str,
        key: Option<String>,
    ) -> LedgerResult<Approval> {
        require_actor(actor_id)?;
        let key = key.unwrap_or_else(|| derive_key(id, TransactionStatus::Completed));
        let action: ActionKey = (id, key.clone());

        if let Some(cached) = self.approvals.get(&action) {
            debug!(transaction_id = %id, key = %key, "Approval replayed from guard");
            return Ok(cached);
        }

        let _txn_guard = self.locks.transactions.acquire(&id).await?;

        // A concurrent caller with the same key may have finished while we waited.
        if let Some(cached) = self.approvals.get(&action) {
            return Ok(cached);
        }

        let txn = self.get(id).await?;
        let from = txn.status;
        match from {
            TransactionStatus::Completed if txn.finalized_with(TransactionStatus::Completed, &key) => {
                let committed_entries = self.store.entries_for_transaction(id).await?;
                debug!(transaction_id = %id, key = %key, "Approval replayed from storage");
                return Ok(self.approvals.record(
                    action,
                    Approval {
                        transaction: txn,
                        committed_entries,
                    },
                ));
            }
            TransactionStatus::Completed | TransactionStatus::Rejected => {
                return Err(LedgerError::already_finalized(id, from));
            }
            TransactionStatus::Pending | TransactionStatus::Processing => {}
        }

        let _account_guards = self.locks.accounts.acquire_many(&txn.legs.accounts()).await?;

        for account_id in txn.legs.accounts() {
            let account = self.account_for(account_id).await?;
            account.ensure_active()?;
            account.ensure_currency(txn.currency)?;
        }
        self.limits.check_maximum(txn.amount)?;
        self.limits.check_minimum(txn.kind(), txn.amount)?;

        if let Some(funding) = txn.legs.funding_account() {
            let available = self.available(funding, Some(id)).await?;
            if txn.amount > available {
                warn!(
                    transaction_id = %id,
                    account_id = %funding,
                    available = %available,
                    requested = %txn.amount,
                    "Approval refused: insufficient funds"
                );
                self.revert_to_pending(id, from).await;
                return Err(LedgerError::InsufficientFunds {
                    account: funding.0,
                    available,
                    requested: txn.amount,
                });
            }
            if txn.kind() == TransactionKind::Withdrawal {
                self.check_daily_cap(funding, txn.amount).await?;
            }
        }

        if from == TransactionStatus::Pending {
            self.transition(&txn, TransactionStatus::Processing).await?;
        }

        let now = Utc::now();
        let batch = CommitBatch::new(
            txn.legs.entries(txn.amount, txn.currency, id, now),
            TransactionWrite::Finalize {
                id,
                expected: TransactionStatus::Processing,
                finalization: Finalization::completed(actor_id, key.clone(), now),
            },
        )
        .with_no_overdraft(txn.legs.funding_account());
        let deltas = batch.deltas();

        let committed = match self.store.append(batch).await {
            Ok(committed) => committed,
            Err(e @ LedgerError::InsufficientFunds { .. }) => {
                self.revert_to_pending(id, TransactionStatus::Processing).await;
                return Err(e);
            }
            Err(e) => {
                error!(
                    transaction_id = %id,
                    error = %e,
                    "Ledger batch failed, transaction left PROCESSING"
                );
                return Err(e);
            }
        };

        for (account_id, delta) in deltas {
            if let Err(e) = self.accounts.apply_delta(account_id, delta).await {
                // Committed already; the next read reloads from the ledger.
                warn!(account_id = %account_id, error = %e, "Balance cache not updated");
            }
        }

        info!(
            transaction_id = %id,
            kind = %committed.transaction.kind(),
            amount = %committed.transaction.amount,
            actor = %actor_id,
            entries = committed.entries.len(),
            "Transaction approved"
        );
        self.events
            .publish(TransitionEvent::for_transaction(&committed.transaction, Some(from)));

        Ok(self.approvals.record(
            action,
            Approval {
                transaction: committed.transaction,
                committed_entries: committed.entries,
            },
        ))
    }

    // ========================================================================
    // Reject
    // ========================================================================

    /// Reject a PENDING or PROCESSING transaction; writes no ledger entries
    ///
    /// `key` defaults to `"{id}:REJECTED"`.
    pub async fn reject(
        &self,
        id: TransactionId,
        actor_id: &str,
        key: Option<String>,
        reason: &str,
    ) -> LedgerResult<Transaction> {
        require_actor(actor_id)?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("rejection reason is required".into()));
        }
        let key = key.unwrap_or_else(|| derive_key(id, TransactionStatus::Rejected));
        let action: ActionKey = (id, key.clone());

        if let Some(cached) = self.rejections.get(&action) {
            return Ok(cached);
        }
        let _txn_guard = self.locks.transactions.acquire(&id).await?;
        if let Some(cached) = self.rejections.get(&action) {
            return Ok(cached);
        }

        let txn = self.get(id).await?;
        let from = txn.status;
        match from {
            TransactionStatus::Rejected if txn.finalized_with(TransactionStatus::Rejected, &key) => {
                return Ok(self.rejections.record(action, txn));
            }
            TransactionStatus::Completed | TransactionStatus::Rejected => {
                return Err(LedgerError::already_finalized(id, from));
            }
            TransactionStatus::Pending | TransactionStatus::Processing => {}
        }

        let finalization = Finalization::rejected(actor_id, key, reason, Utc::now());
        let rejected = self
            .store
            .finalize_if(id, from, &finalization)
            .await?
            .ok_or_else(|| {
                LedgerError::ConcurrencyConflict(format!("transaction {} changed during rejection", id))
            })?;

        info!(
            transaction_id = %id,
            actor = %actor_id,
            reason = %reason,
            "Transaction rejected"
        );
        self.events
            .publish(TransitionEvent::for_transaction(&rejected, Some(from)));

        Ok(self.rejections.record(action, rejected))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get(&self, id: TransactionId) -> LedgerResult<Transaction> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))
    }

    /// Committed ledger entries of a transaction
    pub async fn entries(&self, id: TransactionId) -> LedgerResult<Vec<LedgerEntry>> {
        self.get(id).await?;
        self.store.entries_for_transaction(id).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Common currency of all legs; every account must exist and be ACTIVE
    async fn eligible_currency(&self, legs: &TransactionLegs) -> LedgerResult<Currency> {
        let mut currency: Option<Currency> = None;
        for account_id in legs.accounts() {
            let account = self.account_for(account_id).await?;
            account.ensure_active()?;
            match currency {
                None => currency = Some(account.currency),
                Some(c) => account.ensure_currency(c)?,
            }
        }
        currency.ok_or_else(|| LedgerError::Validation("transaction has no accounts".into()))
    }

    /// Account lookup for a command; an unknown account is a bad request
    async fn account_for(&self, id: AccountId) -> LedgerResult<crate::account::Account> {
        self.accounts.account(id).await.map_err(|e| match e {
            LedgerError::NotFound(_) => {
                LedgerError::Validation(format!("account {} does not exist", id))
            }
            other => other,
        })
    }

    /// Balance minus withdrawal holds; caller holds the account lock
    async fn available(
        &self,
        account: AccountId,
        exclude: Option<TransactionId>,
    ) -> LedgerResult<Decimal> {
        let balance = self.accounts.locked_balance(account).await?;
        if !self.limits.hold_pending_withdrawals {
            return Ok(balance);
        }
        let held = self.store.pending_debits(account, exclude).await?;
        balance
            .checked_sub(held)
            .ok_or_else(|| LedgerError::Overflow(format!("{} - {}", balance, held)))
    }

    async fn check_daily_cap(&self, account: AccountId, amount: Decimal) -> LedgerResult<()> {
        let withdrawn = self
            .store
            .debited_since(account, EntryKind::Withdrawal, day_start(Utc::now()))
            .await?;
        self.limits.check_daily_cap(withdrawn, amount)
    }

    async fn transition(&self, txn: &Transaction, to: TransactionStatus) -> LedgerResult<()> {
        if !txn.status.can_transition_to(to) {
            return Err(LedgerError::InvalidState(format!(
                "illegal transition {} -> {} for {}",
                txn.status, to, txn.id
            )));
        }
        if !self.store.update_status_if(txn.id, txn.status, to).await? {
            return Err(LedgerError::ConcurrencyConflict(format!(
                "transaction {} changed during approval",
                txn.id
            )));
        }
        debug!(transaction_id = %txn.id, from = %txn.status, to = %to, "Status updated");
        Ok(())
    }

    /// Put a PROCESSING transaction whose funds check failed back to PENDING
    async fn revert_to_pending(&self, id: TransactionId, current: TransactionStatus) {
        if current != TransactionStatus::Processing {
            return;
        }
        match self
            .store
            .update_status_if(id, TransactionStatus::Processing, TransactionStatus::Pending)
            .await
        {
            Ok(true) => debug!(transaction_id = %id, "Reverted to PENDING"),
            Ok(false) => warn!(transaction_id = %id, "Revert to PENDING missed, status changed"),
            Err(e) => error!(transaction_id = %id, error = %e, "Revert to PENDING failed"),
        }
    }
}

fn require_actor(actor_id: &str) -> LedgerResult<()> {
    if actor_id.trim().is_empty() {
        return Err(LedgerError::Validation("actor id is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, AccountStatus, AccountType};
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        accounts: Arc<AccountAggregate>,
        machine: TransactionStateMachine,
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    async fn fixture(limits: LimitPolicy) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockManager::default());
        let accounts = Arc::new(AccountAggregate::new(store.clone(), locks.clone()));
        for id in [1, 2] {
            accounts
                .open_account(Account::new(AccountId(id), 1, AccountType::Live, Currency::USD, 100))
                .await
                .unwrap();
        }
        accounts
            .open_account(Account::new(AccountId(3), 2, AccountType::Live, Currency::EUR, 100))
            .await
            .unwrap();
        let machine = TransactionStateMachine::new(
            store.clone(),
            accounts.clone(),
            locks,
            EventBus::new(),
            limits,
        );
        Fixture {
            store,
            accounts,
            machine,
        }
    }

    async fn fund(f: &Fixture, account: u64, amount: i64) {
        let txn = f
            .machine
            .create_pending(TransactionRequest::deposit(AccountId(account), dec(amount), "wire"))
            .await
            .unwrap();
        f.machine.approve(txn.id, "admin-1", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_deposit_lifecycle() {
        let f = fixture(LimitPolicy::default()).await;
        fund(&f, 1, 1000).await;

        let txn = f
            .machine
            .create_pending(TransactionRequest::deposit(AccountId(1), dec(500), "card"))
            .await
            .unwrap();
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert!(f.machine.entries(txn.id).await.unwrap().is_empty());

        let approval = f.machine.approve(txn.id, "admin-1", None).await.unwrap();
        assert_eq!(approval.transaction.status, TransactionStatus::Completed);
        assert_eq!(approval.committed_entries.len(), 1);
        assert_eq!(approval.committed_entries[0].amount, dec(500));
        assert_eq!(f.accounts.get_balance(AccountId(1)).await.unwrap(), dec(1500));
    }

    #[tokio::test]
    async fn test_create_validations() {
        let f = fixture(LimitPolicy::default()).await;
        fund(&f, 1, 100).await;

        // overdraw at creation
        assert!(matches!(
            f.machine
                .create_pending(TransactionRequest::withdrawal(AccountId(1), dec(101), "wire"))
                .await,
            Err(LedgerError::Validation(_))
        ));
        // currency mismatch across legs
        assert!(matches!(
            f.machine
                .create_pending(TransactionRequest::transfer(AccountId(1), AccountId(3), dec(10)))
                .await,
            Err(LedgerError::Validation(_))
        ));
        // same account
        assert!(matches!(
            f.machine
                .create_pending(TransactionRequest::transfer(AccountId(1), AccountId(1), dec(10)))
                .await,
            Err(LedgerError::InvalidTransfer(_))
        ));
        // below minimum
        assert!(matches!(
            f.machine
                .create_pending(TransactionRequest::withdrawal(AccountId(1), dec(5), "wire"))
                .await,
            Err(LedgerError::LimitExceeded(_))
        ));
        // precision beyond cents
        assert!(matches!(
            f.machine
                .create_pending(TransactionRequest::deposit(AccountId(1), Decimal::new(1001, 3), "wire"))
                .await,
            Err(LedgerError::Validation(_))
        ));
        // unknown account
        assert!(matches!(
            f.machine
                .create_pending(TransactionRequest::deposit(AccountId(99), dec(10), "wire"))
                .await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_suspended_account_cannot_be_approved() {
        let f = fixture(LimitPolicy::default()).await;
        let txn = f
            .machine
            .create_pending(TransactionRequest::deposit(AccountId(1), dec(50), "wire"))
            .await
            .unwrap();
        f.accounts
            .set_status(AccountId(1), AccountStatus::Suspended)
            .await
            .unwrap();

        assert!(matches!(
            f.machine.approve(txn.id, "admin-1", None).await,
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(f.machine.get(txn.id).await.unwrap().status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_repeated_key_returns_original_result() {
        let f = fixture(LimitPolicy::default()).await;
        let txn = f
            .machine
            .create_pending(TransactionRequest::deposit(AccountId(1), dec(500), "wire"))
            .await
            .unwrap();

        let first = f
            .machine
            .approve(txn.id, "admin-1", Some("click-1".into()))
            .await
            .unwrap();
        let second = f
            .machine
            .approve(txn.id, "admin-1", Some("click-1".into()))
            .await
            .unwrap();
        assert_eq!(first.transaction, second.transaction);
        assert_eq!(f.accounts.get_balance(AccountId(1)).await.unwrap(), dec(500));
        assert_eq!(f.store.append_count(), 1);

        // different key on a finalized transaction
        let err = f
            .machine
            .approve(txn.id, "admin-2", Some("click-2".into()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("transaction already finalized"));
    }

    #[tokio::test]
    async fn test_reject_then_approve_fails() {
        let f = fixture(LimitPolicy::default()).await;
        fund(&f, 1, 200).await;
        let txn = f
            .machine
            .create_pending(TransactionRequest::withdrawal(AccountId(1), dec(50), "wire"))
            .await
            .unwrap();

        let rejected = f
            .machine
            .reject(txn.id, "admin-1", None, "documents missing")
            .await
            .unwrap();
        assert_eq!(rejected.status, TransactionStatus::Rejected);
        assert_eq!(rejected.reason.as_deref(), Some("documents missing"));

        // same default key replays
        let again = f
            .machine
            .reject(txn.id, "admin-1", None, "documents missing")
            .await
            .unwrap();
        assert_eq!(again, rejected);

        assert!(matches!(
            f.machine.approve(txn.id, "admin-1", None).await,
            Err(LedgerError::InvalidState(_))
        ));
        assert_eq!(f.accounts.get_balance(AccountId(1)).await.unwrap(), dec(200));
        assert!(f.machine.entries(txn.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_processing_and_retry_resumes() {
        let f = fixture(LimitPolicy::default()).await;
        let txn = f
            .machine
            .create_pending(TransactionRequest::deposit(AccountId(1), dec(70), "wire"))
            .await
            .unwrap();

        f.store.set_fail_append(true);
        let err = f
            .machine
            .approve(txn.id, "admin-1", Some("k".into()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            f.machine.get(txn.id).await.unwrap().status,
            TransactionStatus::Processing
        );
        assert_eq!(f.accounts.get_balance(AccountId(1)).await.unwrap(), Decimal::ZERO);

        f.store.set_fail_append(false);
        let approval = f
            .machine
            .approve(txn.id, "admin-1", Some("k".into()))
            .await
            .unwrap();
        assert_eq!(approval.transaction.status, TransactionStatus::Completed);
        assert_eq!(f.accounts.get_balance(AccountId(1)).await.unwrap(), dec(70));
    }

    #[tokio::test]
    async fn test_daily_withdrawal_cap() {
        let f = fixture(LimitPolicy {
            daily_withdrawal_cap: dec(100),
            ..LimitPolicy::default()
        })
        .await;
        fund(&f, 1, 1000).await;

        let w1 = f
            .machine
            .create_pending(TransactionRequest::withdrawal(AccountId(1), dec(80), "wire"))
            .await
            .unwrap();
        let w2 = f
            .machine
            .create_pending(TransactionRequest::withdrawal(AccountId(1), dec(30), "wire"))
            .await
            .unwrap();
        f.machine.approve(w1.id, "admin-1", None).await.unwrap();

        assert!(matches!(
            f.machine.approve(w2.id, "admin-1", None).await,
            Err(LedgerError::LimitExceeded(_))
        ));
        assert_eq!(f.machine.get(w2.id).await.unwrap().status, TransactionStatus::Pending);
        assert_eq!(f.accounts.get_balance(AccountId(1)).await.unwrap(), dec(920));
    }

    #[tokio::test]
    async fn test_withdrawal_holds() {
        let f = fixture(LimitPolicy {
            hold_pending_withdrawals: true,
            ..LimitPolicy::default()
        })
        .await;
        fund(&f, 1, 100).await;

        let w1 = f
            .machine
            .create_pending(TransactionRequest::withdrawal(AccountId(1), dec(60), "wire"))
            .await
            .unwrap();
        // 60 is held, only 40 available
        assert!(matches!(
            f.machine
                .create_pending(TransactionRequest::withdrawal(AccountId(1), dec(50), "wire"))
                .await,
            Err(LedgerError::Validation(_))
        ));

        // rejecting releases the hold
        f.machine.reject(w1.id, "admin-1", None, "cancelled").await.unwrap();
        assert!(f
            .machine
            .create_pending(TransactionRequest::withdrawal(AccountId(1), dec(50), "wire"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_blank_actor_rejected() {
        let f = fixture(LimitPolicy::default()).await;
        let txn = f
            .machine
            .create_pending(TransactionRequest::deposit(AccountId(1), dec(5), "wire"))
            .await
            .unwrap();
        assert!(matches!(
            f.machine.approve(txn.id, " ", None).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            f.machine.approve(TransactionId::new(), "admin", None).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_amount_rejected_before_any_write() {
        let f = fixture(LimitPolicy::default()).await;
        let err = f
            .machine
            .create_pending(TransactionRequest::deposit(AccountId(1), Decimal::MAX, "wire"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(f
            .store
            .transactions_updated_since(chrono::DateTime::UNIX_EPOCH)
            .await
            .unwrap()
            .is_empty());

        // the ceiling itself is accepted
        let max = f.machine.limits().max_transaction_amount;
        let txn = f
            .machine
            .create_pending(TransactionRequest::deposit(AccountId(1), max, "wire"))
            .await
            .unwrap();
        f.machine.approve(txn.id, "admin-1", None).await.unwrap();
        assert_eq!(f.accounts.get_balance(AccountId(1)).await.unwrap(), max);
    }
}
