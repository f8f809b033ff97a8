//! Commission payout engine
//!
//! Accrues IB commission on referred volume and pays accruals out to the
//! IB's trading account. A payout is one atomic ledger batch: a COMPLETED
//! COMMISSION_PAYOUT transaction, the pool debit, the IB credit and the
//! `paid` flag on the accrual.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::models::{AccrualOutcome, CommissionAccrual, IbProfile, Payout, PayoutStatus, Period};
use super::tier::tiered_commission;
use crate::account::{Account, AccountAggregate};
use crate::core_types::{AccountId, AccrualId, IbId};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBus, TransitionEvent};
use crate::guard::{IdempotencyGuard, LockManager};
use crate::ledger::{AccrualSettlement, CommitBatch, TransactionWrite};
use crate::money::{Currency, checked_add};
use crate::store::LedgerStore;
use crate::transaction::limits::trailing_window_start;
use crate::transaction::{Finalization, Transaction, TransactionLegs};

/// Trailing window for tier volume
pub const TIER_WINDOW_DAYS: i64 = 30;

/// Commission settings (loaded from the `commission` config section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionPolicy {
    /// House account commission is paid from
    pub pool_account: AccountId,
    pub currency: Currency,
    /// Smallest accrual paid out
    #[serde(default = "default_payout_threshold")]
    pub payout_threshold: Decimal,
    /// Day of month the scheduler pays out
    #[serde(default = "default_payout_day")]
    pub payout_day: u32,
    /// Largest volume update accepted by one accrual
    #[serde(default = "default_max_volume_delta")]
    pub max_volume_delta: Decimal,
}

fn default_payout_threshold() -> Decimal {
    Decimal::new(100, 0)
}

fn default_payout_day() -> u32 {
    15
}

fn default_max_volume_delta() -> Decimal {
    Decimal::new(1_000_000_000, 0)
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self {
            pool_account: AccountId(900_000),
            currency: Currency::USD,
            payout_threshold: default_payout_threshold(),
            payout_day: default_payout_day(),
            max_volume_delta: default_max_volume_delta(),
        }
    }
}

pub struct CommissionEngine {
    store: Arc<dyn LedgerStore>,
    accounts: Arc<AccountAggregate>,
    locks: Arc<LockManager>,
    events: EventBus,
    policy: CommissionPolicy,
    payouts: IdempotencyGuard<(AccrualId, String), Payout>,
}

impl CommissionEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: Arc<AccountAggregate>,
        locks: Arc<LockManager>,
        events: EventBus,
        policy: CommissionPolicy,
    ) -> Self {
        Self {
            store,
            accounts,
            locks,
            events,
            policy,
            payouts: IdempotencyGuard::new(),
        }
    }

    pub fn policy(&self) -> &CommissionPolicy {
        &self.policy
    }

    /// Register an IB or change its payout account
    pub async fn register_ib(&self, ib: IbId, payout_account: AccountId) -> LedgerResult<IbProfile> {
        let account = self.payout_target(payout_account).await?;
        account.ensure_currency(self.policy.currency)?;

        let profile = IbProfile::new(ib, payout_account);
        self.store.upsert_ib(&profile).await?;
        info!(ib_id = %ib, payout_account = %payout_account, "IB registered");
        Ok(profile)
    }

    // ========================================================================
    // Accrual
    // ========================================================================

    /// Accrue commission for newly reported referred volume
    pub async fn accrue(
        &self,
        ib: IbId,
        period: Period,
        volume_delta: Decimal,
    ) -> LedgerResult<AccrualOutcome> {
        self.accrue_at(ib, period, volume_delta, Utc::now()).await
    }

    /// [`Self::accrue`] with an explicit clock
    pub async fn accrue_at(
        &self,
        ib: IbId,
        period: Period,
        volume_delta: Decimal,
        at: DateTime<Utc>,
    ) -> LedgerResult<AccrualOutcome> {
        if volume_delta <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "volume delta must be positive, got {}",
                volume_delta
            )));
        }
        if volume_delta > self.policy.max_volume_delta {
            return Err(LedgerError::Validation(format!(
                "volume delta {} exceeds the per-accrual maximum {}",
                volume_delta, self.policy.max_volume_delta
            )));
        }
        self.ib_profile(ib).await?;

        // Trailing volume read and sample write must not interleave per IB.
        let _guard = self.locks.ibs.acquire(&ib).await?;

        let trailing = self
            .store
            .volume_since(ib, trailing_window_start(at, TIER_WINDOW_DAYS))
            .await?;
        let breakdown = tiered_commission(trailing, volume_delta)?;
        let accrued = breakdown
            .total()
            .round_dp(self.policy.currency.minor_units());

        let accrual = self
            .store
            .record_accrual(ib, period, self.policy.currency, volume_delta, accrued, at)
            .await?;

        for slice in &breakdown.slices {
            debug!(
                ib_id = %ib,
                tier = %slice.tier,
                volume = %slice.volume,
                commission = %slice.commission,
                "Tier slice"
            );
        }
        info!(
            ib_id = %ib,
            period = %period,
            volume_delta = %volume_delta,
            accrued = %accrued,
            pending = %accrual.amount,
            tier = %breakdown.tier,
            "Commission accrued"
        );

        Ok(AccrualOutcome {
            accrual_id: accrual.id,
            tier: breakdown.tier,
            accrued,
            pending_amount: accrual.amount,
            trailing_volume: checked_add(trailing, volume_delta)?,
        })
    }

    pub async fn accrual(&self, id: AccrualId) -> LedgerResult<CommissionAccrual> {
        self.store
            .get_accrual(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("accrual {}", id)))
    }

    /// Unpaid accruals of periods before `before` that meet the threshold
    pub async fn due_accruals(&self, before: Period) -> LedgerResult<Vec<CommissionAccrual>> {
        Ok(self
            .store
            .unpaid_accruals()
            .await?
            .into_iter()
            .filter(|a| a.period < before && a.amount >= self.policy.payout_threshold)
            .collect())
    }

    // ========================================================================
    // Payout
    // ========================================================================

    /// Pay an accrual out
    ///
    /// `key` defaults to `"payout:{accrual_id}"`. Repeating a successful
    /// payout with the same key returns the original payout.
    pub async fn process_payout(
        &self,
        accrual_id: AccrualId,
        actor_id: &str,
        key: Option<String>,
    ) -> LedgerResult<Payout> {
        if actor_id.trim().is_empty() {
            return Err(LedgerError::Validation("actor id is required".into()));
        }
        let key = key.unwrap_or_else(|| format!("payout:{}", accrual_id));
        let action = (accrual_id, key.clone());

        if let Some(cached) = self.payouts.get(&action) {
            return Ok(cached);
        }

        // Lock order: IB, accrual, accounts. The IB lock keeps `accrue` from
        // growing the accrual between the amount read and the settlement.
        let ib_id = self.accrual(accrual_id).await?.ib_id;
        let _ib_guard = self.locks.ibs.acquire(&ib_id).await?;
        let _accrual_guard = self.locks.accruals.acquire(&accrual_id).await?;
        if let Some(cached) = self.payouts.get(&action) {
            return Ok(cached);
        }

        let accrual = self.accrual(accrual_id).await?;
        if accrual.paid {
            if accrual.payout_key.as_deref() == Some(key.as_str()) {
                let payout = Payout::from_paid(&accrual).ok_or_else(|| {
                    LedgerError::Storage(format!("paid accrual {} lacks settlement data", accrual_id))
                })?;
                return Ok(self.payouts.record(action, payout));
            }
            return Err(LedgerError::AlreadyPaid(format!(
                "accrual {} was paid at {}",
                accrual_id,
                accrual.paid_at.map(|t| t.to_rfc3339()).unwrap_or_default()
            )));
        }
        if accrual.amount < self.policy.payout_threshold {
            return Err(LedgerError::BelowThreshold {
                amount: accrual.amount,
                threshold: self.policy.payout_threshold,
            });
        }

        let profile = self.ib_profile(accrual.ib_id).await?;
        let pool = self.policy.pool_account;
        let ib_account = profile.payout_account;

        let _account_guards = self.locks.accounts.acquire_many(&[pool, ib_account]).await?;

        self.payout_target(pool)
            .await?
            .ensure_currency(accrual.currency)?;
        let target = self.payout_target(ib_account).await?;
        target.ensure_active()?;
        target.ensure_currency(accrual.currency)?;

        let now = Utc::now();
        let legs = TransactionLegs::CommissionPayout {
            pool,
            ib_account,
            accrual: accrual_id,
        };
        let mut txn = Transaction::pending(
            legs,
            accrual.amount,
            accrual.currency,
            "commission",
            Some(format!("{} commission {}", accrual.ib_id, accrual.period)),
        );
        txn.finalize(&Finalization::completed(actor_id, key.clone(), now));
        let txn_id = txn.id;

        let batch = CommitBatch::new(
            legs.entries(accrual.amount, accrual.currency, txn_id, now),
            TransactionWrite::Insert(txn),
        )
        .with_settlement(AccrualSettlement {
            accrual_id,
            transaction_id: txn_id,
            idempotency_key: key,
            expected_amount: accrual.amount,
            paid_at: now,
        });
        let deltas = batch.deltas();

        let committed = self.store.append(batch).await.map_err(|e| {
            error!(accrual_id = %accrual_id, error = %e, "Payout batch failed");
            e
        })?;

        for (account_id, delta) in deltas {
            if let Err(e) = self.accounts.apply_delta(account_id, delta).await {
                warn!(account_id = %account_id, error = %e, "Balance cache not updated");
            }
        }

        info!(
            accrual_id = %accrual_id,
            ib_id = %accrual.ib_id,
            period = %accrual.period,
            amount = %accrual.amount,
            transaction_id = %txn_id,
            actor = %actor_id,
            "Commission paid"
        );
        self.events
            .publish(TransitionEvent::for_transaction(&committed.transaction, None));

        Ok(self.payouts.record(
            action,
            Payout {
                accrual_id,
                ib_id: accrual.ib_id,
                period: accrual.period,
                transaction_id: txn_id,
                amount: accrual.amount,
                currency: accrual.currency,
                status: PayoutStatus::Paid,
                paid_at: now,
            },
        ))
    }

    async fn ib_profile(&self, ib: IbId) -> LedgerResult<IbProfile> {
        self.store
            .get_ib(ib)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("{} is not registered", ib)))
    }

    async fn payout_target(&self, id: AccountId) -> LedgerResult<Account> {
        self.accounts.account(id).await.map_err(|e| match e {
            LedgerError::NotFound(_) => {
                LedgerError::Validation(format!("account {} does not exist", id))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::commission::Tier;
    use crate::store::MemoryStore;

    const POOL: u64 = 900_000;
    const IB_ACCOUNT: u64 = 5001;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn m(v: i64) -> Decimal {
        Decimal::from(v) * Decimal::from(100_000)
    }

    async fn engine() -> (Arc<MemoryStore>, Arc<AccountAggregate>, CommissionEngine) {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockManager::default());
        let accounts = Arc::new(AccountAggregate::new(store.clone(), locks.clone()));
        for id in [POOL, IB_ACCOUNT] {
            accounts
                .open_account(Account::new(AccountId(id), 1, AccountType::Live, Currency::USD, 1))
                .await
                .unwrap();
        }
        let engine = CommissionEngine::new(
            store.clone(),
            accounts.clone(),
            locks,
            EventBus::new(),
            CommissionPolicy::default(),
        );
        engine.register_ib(IbId(1), AccountId(IB_ACCOUNT)).await.unwrap();
        (store, accounts, engine)
    }

    fn period() -> Period {
        Period::new(2026, 9).unwrap()
    }

    #[tokio::test]
    async fn test_accrue_crossing_gold_floor() {
        let (_, _, engine) = engine().await;
        let at = Utc::now();
        engine.accrue_at(IbId(1), period(), m(49), at).await.unwrap();

        let outcome = engine.accrue_at(IbId(1), period(), m(2), at).await.unwrap();
        assert_eq!(outcome.tier, Tier::Gold);
        assert_eq!(outcome.accrued, dec(55_000));
        assert_eq!(outcome.trailing_volume, m(51));
    }

    #[tokio::test]
    async fn test_old_volume_leaves_trailing_window() {
        let (_, _, engine) = engine().await;
        let now = Utc::now();
        engine
            .accrue_at(IbId(1), period(), m(60), now - chrono::Duration::days(31))
            .await
            .unwrap();

        let outcome = engine.accrue_at(IbId(1), period(), dec(1000), now).await.unwrap();
        assert_eq!(outcome.tier, Tier::Bronze);
        assert_eq!(outcome.accrued, dec(200));
    }

    #[tokio::test]
    async fn test_unregistered_ib_and_bad_delta() {
        let (_, _, engine) = engine().await;
        assert!(matches!(
            engine.accrue(IbId(2), period(), dec(10)).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            engine.accrue(IbId(1), period(), Decimal::ZERO).await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_payout_moves_pool_to_ib_once() {
        let (store, accounts, engine) = engine().await;
        let outcome = engine.accrue(IbId(1), period(), dec(1000)).await.unwrap();
        assert_eq!(outcome.pending_amount, dec(200));

        let payout = engine
            .process_payout(outcome.accrual_id, "admin-1", None)
            .await
            .unwrap();
        assert_eq!(payout.status, PayoutStatus::Paid);
        assert_eq!(payout.amount, dec(200));
        assert_eq!(accounts.get_balance(AccountId(IB_ACCOUNT)).await.unwrap(), dec(200));
        assert_eq!(accounts.get_balance(AccountId(POOL)).await.unwrap(), dec(-200));

        // same key replays, no second batch
        let again = engine
            .process_payout(outcome.accrual_id, "admin-1", None)
            .await
            .unwrap();
        assert_eq!(again, payout);
        assert_eq!(store.append_count(), 1);

        // different key is AlreadyPaid
        assert!(matches!(
            engine
                .process_payout(outcome.accrual_id, "admin-2", Some("other".into()))
                .await,
            Err(LedgerError::AlreadyPaid(_))
        ));

        let entries = store.entries_for_transaction(payout.transaction_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().map(|e| e.amount).sum::<Decimal>().is_zero());
    }

    #[tokio::test]
    async fn test_payout_below_threshold() {
        let (_, _, engine) = engine().await;
        // 400 * 20% = 80 < 100
        let outcome = engine.accrue(IbId(1), period(), dec(400)).await.unwrap();
        assert!(matches!(
            engine.process_payout(outcome.accrual_id, "admin-1", None).await,
            Err(LedgerError::BelowThreshold { .. })
        ));
        assert!(!engine.accrual(outcome.accrual_id).await.unwrap().paid);
    }

    #[tokio::test]
    async fn test_due_accruals_filters_period_and_threshold() {
        let (_, _, engine) = engine().await;
        engine.accrue(IbId(1), period(), dec(1000)).await.unwrap();
        engine
            .accrue(IbId(1), Period::new(2026, 8).unwrap(), dec(100))
            .await
            .unwrap();
        engine
            .accrue(IbId(1), Period::new(2026, 10).unwrap(), dec(5000))
            .await
            .unwrap();

        let due = engine.due_accruals(Period::new(2026, 10).unwrap()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].period, period());
    }
}
