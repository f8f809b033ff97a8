#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;

use fxledger::config::AppConfig;
use fxledger::events::EventBus;
use fxledger::{
    Account, AccountId, AccountType, Currency, LedgerServices, MemoryStore, TransactionRequest,
};

pub const CONFIG: &str = r#"
log_level: info
log_dir: logs
log_file: fxledger-test.log
use_json: false
rotation: never
gateway:
  host: 127.0.0.1
  port: 0
lock_timeout_ms: 2000
"#;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub services: LedgerServices,
}

pub fn dec(v: i64) -> Decimal {
    Decimal::new(v, 0)
}

pub async fn harness() -> Harness {
    let config = AppConfig::from_yaml(CONFIG).unwrap();
    let store = Arc::new(MemoryStore::new());
    let services = LedgerServices::new(store.clone(), EventBus::new(), &config);
    services.ensure_pool_account().await.unwrap();
    Harness { store, services }
}

impl Harness {
    pub async fn open(&self, id: u64) -> AccountId {
        self.services
            .accounts
            .open_account(Account::new(
                AccountId(id),
                id,
                AccountType::Live,
                Currency::USD,
                100,
            ))
            .await
            .unwrap();
        AccountId(id)
    }

    pub async fn balance(&self, id: AccountId) -> Decimal {
        self.services.accounts.get_balance(id).await.unwrap()
    }

    /// Deposit and approve in one go
    pub async fn fund(&self, id: AccountId, amount: Decimal) {
        let txn = self
            .services
            .transactions
            .create_pending(TransactionRequest::deposit(id, amount, "bank_wire"))
            .await
            .unwrap();
        self.services
            .transactions
            .approve(txn.id, "ops:test", None)
            .await
            .unwrap();
    }
}
