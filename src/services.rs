//! Service wiring
//!
//! Builds the store, lock manager, account aggregate, state machine and
//! commission engine from an [`AppConfig`] and hands out the background
//! workers that share them.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::account::{Account, AccountAggregate, AccountType};
use crate::commission::{CommissionEngine, PayoutScheduler};
use crate::config::AppConfig;
use crate::core_types::ClientId;
use crate::db::Database;
use crate::error::LedgerResult;
use crate::events::{EventBus, TracingSink};
use crate::guard::LockManager;
use crate::reconciliation::ReconciliationWorker;
use crate::store::{LedgerStore, MemoryStore, PgStore};
use crate::transaction::TransactionStateMachine;

/// Client id recorded on house accounts created by the ledger itself
pub const HOUSE_CLIENT_ID: ClientId = 0;

#[derive(Clone)]
pub struct LedgerServices {
    pub store: Arc<dyn LedgerStore>,
    pub locks: Arc<LockManager>,
    pub accounts: Arc<AccountAggregate>,
    pub transactions: Arc<TransactionStateMachine>,
    pub commissions: Arc<CommissionEngine>,
    /// Present when running on PostgreSQL
    pub db: Option<Arc<Database>>,
}

impl LedgerServices {
    /// Wire services over an existing store
    pub fn new(store: Arc<dyn LedgerStore>, events: EventBus, config: &AppConfig) -> Self {
        let locks = Arc::new(LockManager::new(config.lock_timeout()));
        let accounts = Arc::new(AccountAggregate::new(store.clone(), locks.clone()));
        let transactions = Arc::new(TransactionStateMachine::new(
            store.clone(),
            accounts.clone(),
            locks.clone(),
            events.clone(),
            config.limits.clone(),
        ));
        let commissions = Arc::new(CommissionEngine::new(
            store.clone(),
            accounts.clone(),
            locks.clone(),
            events,
            config.commission.clone(),
        ));

        Self {
            store,
            locks,
            accounts,
            transactions,
            commissions,
            db: None,
        }
    }

    /// Connect the configured backend, apply the schema and warm the cache
    pub async fn from_config(config: &AppConfig) -> LedgerResult<Self> {
        let events = EventBus::new().with_sink(Arc::new(TracingSink));

        let services = match config.postgres_url.as_deref() {
            Some(url) => {
                let db = Arc::new(Database::connect(url, config.postgres_max_connections).await?);
                let store = PgStore::from_database(&db);
                store.migrate().await?;
                let mut services = Self::new(Arc::new(store), events, config);
                services.db = Some(db);
                services
            }
            None => {
                info!("No postgres_url configured, using the in-memory ledger store");
                Self::new(Arc::new(MemoryStore::new()), events, config)
            }
        };

        services.ensure_pool_account().await?;
        services.accounts.warm().await?;
        info!(store = services.store.name(), "Ledger services ready");
        Ok(services)
    }

    /// Open the commission pool account if it does not exist yet
    pub async fn ensure_pool_account(&self) -> LedgerResult<()> {
        let policy = self.commissions.policy();
        if self.store.get_account(policy.pool_account).await?.is_some() {
            return Ok(());
        }
        self.accounts
            .open_account(Account::new(
                policy.pool_account,
                HOUSE_CLIENT_ID,
                AccountType::Live,
                policy.currency,
                1,
            ))
            .await?;
        info!(account_id = %policy.pool_account, "Commission pool account opened");
        Ok(())
    }

    pub fn reconciliation_worker(&self, interval: Duration) -> ReconciliationWorker {
        ReconciliationWorker::new(
            self.store.clone(),
            self.accounts.clone(),
            self.locks.clone(),
            interval,
        )
    }

    pub fn payout_scheduler(&self, check_interval: Duration) -> PayoutScheduler {
        PayoutScheduler::new(self.commissions.clone(), check_interval)
    }

    pub async fn health_check(&self) -> LedgerResult<()> {
        if let Some(db) = &self.db {
            db.health_check().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_opens_pool_account_once() {
        let config = AppConfig::load("dev").unwrap();
        let services = LedgerServices::from_config(&config).await.unwrap();
        let pool = config.commission.pool_account;
        let account = services.accounts.account(pool).await.unwrap();
        assert_eq!(account.client_id, HOUSE_CLIENT_ID);
        assert_eq!(account.currency, config.commission.currency);

        // idempotent
        services.ensure_pool_account().await.unwrap();
        assert_eq!(services.store.list_accounts().await.unwrap().len(), 1);
        assert!(services.health_check().await.is_ok());
    }
}
