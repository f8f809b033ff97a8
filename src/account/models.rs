//! Data models for trading accounts

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, ClientId};
use crate::error::LedgerError;
use crate::money::Currency;

/// Account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i16)]
pub enum AccountType {
    Live = 1,
    Demo = 2,
}

impl AccountType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AccountType::Live),
            2 => Some(AccountType::Demo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Live => "LIVE",
            AccountType::Demo => "DEMO",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status
///
/// Accounts are never deleted; closing is a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i16)]
pub enum AccountStatus {
    Active = 1,
    Suspended = 2,
    Closed = 3,
}

impl AccountStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AccountStatus::Active),
            2 => Some(AccountStatus::Suspended),
            3 => Some(AccountStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Suspended => "SUSPENDED",
            AccountStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(AccountStatus::Active),
            "SUSPENDED" => Ok(AccountStatus::Suspended),
            "CLOSED" => Ok(AccountStatus::Closed),
            _ => Err(format!("Invalid account status: {}", s)),
        }
    }
}

/// Trading account
///
/// There is deliberately no balance field: the balance of an account is the
/// sum of its committed ledger entries, served by `AccountAggregate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub client_id: ClientId,
    pub account_type: AccountType,
    pub currency: Currency,
    pub leverage: u32,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new ACTIVE account record
    pub fn new(
        id: AccountId,
        client_id: ClientId,
        account_type: AccountType,
        currency: Currency,
        leverage: u32,
    ) -> Self {
        Self {
            id,
            client_id,
            account_type,
            currency,
            leverage,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Eligibility gate for any balance-affecting command
    pub fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LedgerError::Validation(format!(
                "account {} is {}",
                self.id, self.status
            )))
        }
    }

    pub fn ensure_currency(&self, currency: Currency) -> Result<(), LedgerError> {
        if self.currency == currency {
            Ok(())
        } else {
            Err(LedgerError::Validation(format!(
                "account {} is denominated in {}, not {}",
                self.id, self.currency, currency
            )))
        }
    }
}

/// Point-in-time view of an account's money
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceSnapshot {
    pub account_id: AccountId,
    pub balance: Decimal,
    /// balance + floating P/L pushed by the trading bridge
    pub equity: Decimal,
    pub currency: Currency,
}
