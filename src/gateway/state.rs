use std::time::Instant;

use crate::core_types::AccountId;
use crate::error::{LedgerError, LedgerResult};
use crate::money::Currency;
use crate::services::LedgerServices;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    pub services: LedgerServices,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(services: LedgerServices) -> Self {
        Self {
            services,
            started_at: Instant::now(),
        }
    }

    /// Currency of an account named by a command
    ///
    /// An unknown account in a command body is a validation failure, not a
    /// missing resource.
    pub async fn account_currency(&self, id: AccountId) -> LedgerResult<Currency> {
        match self.services.accounts.account(id).await {
            Ok(account) => Ok(account.currency),
            Err(LedgerError::NotFound(_)) => {
                Err(LedgerError::Validation(format!("unknown account {}", id)))
            }
            Err(e) => Err(e),
        }
    }
}
