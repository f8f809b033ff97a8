//! Commission data models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, AccrualId, IbId, TransactionId};
use crate::error::LedgerError;
use crate::money::Currency;

use super::tier::Tier;

/// Accrual period: a calendar month, `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, LedgerError> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::Validation(format!(
                "invalid period month: {}",
                month
            )));
        }
        Ok(Self { year, month })
    }

    /// Period containing `at`
    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the period
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
            .map_err(|_| LedgerError::Validation(format!("invalid period: {} (expected YYYY-MM)", s)))?;
        Ok(Self {
            year: date.year(),
            month: date.month(),
        })
    }
}

impl TryFrom<String> for Period {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

/// Introducing broker profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IbProfile {
    pub ib_id: IbId,
    /// Trading account commission is paid into
    pub payout_account: AccountId,
    pub created_at: DateTime<Utc>,
}

impl IbProfile {
    pub fn new(ib_id: IbId, payout_account: AccountId) -> Self {
        Self {
            ib_id,
            payout_account,
            created_at: Utc::now(),
        }
    }
}

/// Referred trading volume reported for an IB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSample {
    pub ib_id: IbId,
    pub volume: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// Pending (or paid) commission of one IB for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionAccrual {
    pub id: AccrualId,
    pub ib_id: IbId,
    pub period: Period,
    pub amount: Decimal,
    pub currency: Currency,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payout_transaction_id: Option<TransactionId>,
    pub payout_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CommissionAccrual {
    /// Fresh, empty accrual
    pub fn open(ib_id: IbId, period: Period, currency: Currency) -> Self {
        Self {
            id: AccrualId::new(),
            ib_id,
            period,
            amount: Decimal::ZERO,
            currency,
            paid: false,
            paid_at: None,
            payout_transaction_id: None,
            payout_key: None,
            updated_at: Utc::now(),
        }
    }
}

/// Result of `CommissionEngine::accrue`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccrualOutcome {
    pub accrual_id: AccrualId,
    pub tier: Tier,
    pub accrued: Decimal,
    pub pending_amount: Decimal,
    pub trailing_volume: Decimal,
}

/// Payout status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayoutStatus {
    Paid,
}

/// Result of `CommissionEngine::process_payout`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payout {
    pub accrual_id: AccrualId,
    pub ib_id: IbId,
    pub period: Period,
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PayoutStatus,
    pub paid_at: DateTime<Utc>,
}

impl Payout {
    /// Rebuild the payout view of an already-paid accrual
    pub fn from_paid(accrual: &CommissionAccrual) -> Option<Self> {
        Some(Self {
            accrual_id: accrual.id,
            ib_id: accrual.ib_id,
            period: accrual.period,
            transaction_id: accrual.payout_transaction_id?,
            amount: accrual.amount,
            currency: accrual.currency,
            status: PayoutStatus::Paid,
            paid_at: accrual.paid_at?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_parse_and_display() {
        let p: Period = "2026-03".parse().unwrap();
        assert_eq!(p.year(), 2026);
        assert_eq!(p.month(), 3);
        assert_eq!(p.to_string(), "2026-03");

        assert!("2026-13".parse::<Period>().is_err());
        assert!("March".parse::<Period>().is_err());
        assert!(Period::new(2026, 0).is_err());
    }

    #[test]
    fn test_period_ordering_and_of() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        assert_eq!(Period::of(at), Period::new(2026, 10).unwrap());
        assert!(Period::new(2025, 12).unwrap() < Period::new(2026, 1).unwrap());
    }

    #[test]
    fn test_payout_from_paid_requires_settlement() {
        let mut accrual = CommissionAccrual::open(IbId(1), Period::new(2026, 9).unwrap(), Currency::USD);
        assert!(Payout::from_paid(&accrual).is_none());

        accrual.paid = true;
        accrual.paid_at = Some(Utc::now());
        accrual.payout_transaction_id = Some(TransactionId::new());
        let payout = Payout::from_paid(&accrual).unwrap();
        assert_eq!(payout.status, PayoutStatus::Paid);
        assert_eq!(payout.accrual_id, accrual.id);
    }
}
