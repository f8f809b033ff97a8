use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::commission::CommissionPolicy;
use crate::transaction::LimitPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Emit `audit` target events (transaction transitions)
    #[serde(default = "default_true")]
    pub enable_audit_log: bool,
    pub gateway: GatewayConfig,
    /// PostgreSQL ledger store; in-memory store when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub postgres_max_connections: u32,
    #[serde(default)]
    pub limits: LimitPolicy,
    /// Upper bound on waiting for an account or transaction lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub commission: CommissionPolicy,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub payout_scheduler: PayoutSchedulerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PayoutSchedulerConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
}

impl Default for PayoutSchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 3600,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    20
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.min_withdrawal < Decimal::ZERO || limits.min_transfer < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "limits: minimum amounts must not be negative".into(),
            ));
        }
        if limits.max_transaction_amount <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "limits: max_transaction_amount must be positive".into(),
            ));
        }
        if limits.daily_withdrawal_cap <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "limits: daily_withdrawal_cap must be positive".into(),
            ));
        }
        if self.postgres_max_connections == 0 {
            return Err(ConfigError::Invalid(
                "postgres_max_connections must be > 0".into(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid("lock_timeout_ms must be > 0".into()));
        }
        if !(1..=28).contains(&self.commission.payout_day) {
            return Err(ConfigError::Invalid(format!(
                "commission: payout_day {} outside 1..=28",
                self.commission.payout_day
            )));
        }
        if self.commission.max_volume_delta <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "commission: max_volume_delta must be positive".into(),
            ));
        }
        if self.commission.payout_threshold < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "commission: payout_threshold must not be negative".into(),
            ));
        }
        if self.reconciliation.enabled && self.reconciliation.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation: interval_secs must be > 0".into(),
            ));
        }
        if self.payout_scheduler.enabled && self.payout_scheduler.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "payout_scheduler: check_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
