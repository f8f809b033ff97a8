//! Amount limits for withdrawals and internal transfers

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::money::checked_add;

use super::types::TransactionKind;

/// Limit policy (loaded from the `limits` config section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitPolicy {
    /// Smallest withdrawal accepted
    pub min_withdrawal: Decimal,
    /// Smallest internal transfer accepted
    pub min_transfer: Decimal,
    /// Cumulative completed withdrawals per account per UTC day
    pub daily_withdrawal_cap: Decimal,
    /// Count PENDING/PROCESSING withdrawals against available balance
    #[serde(default)]
    pub hold_pending_withdrawals: bool,
    /// Largest amount of a single deposit, withdrawal or transfer
    #[serde(default = "default_max_transaction_amount")]
    pub max_transaction_amount: Decimal,
}

fn default_max_transaction_amount() -> Decimal {
    Decimal::new(10_000_000, 0)
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            min_withdrawal: Decimal::new(10, 0),
            min_transfer: Decimal::ONE,
            daily_withdrawal_cap: Decimal::new(50_000, 0),
            hold_pending_withdrawals: false,
            max_transaction_amount: default_max_transaction_amount(),
        }
    }
}

impl LimitPolicy {
    /// Minimum amount check for the kind
    pub fn check_minimum(&self, kind: TransactionKind, amount: Decimal) -> Result<(), LedgerError> {
        let min = match kind {
            TransactionKind::Withdrawal => self.min_withdrawal,
            TransactionKind::InternalTransfer => self.min_transfer,
            TransactionKind::Deposit | TransactionKind::CommissionPayout => return Ok(()),
        };

        if amount < min {
            return Err(LedgerError::LimitExceeded(format!(
                "{} of {} is below the minimum of {}",
                kind, amount, min
            )));
        }
        Ok(())
    }

    /// Upper bound on a single request amount
    pub fn check_maximum(&self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.max_transaction_amount {
            return Err(LedgerError::Validation(format!(
                "amount {} exceeds the per-transaction maximum {}",
                amount, self.max_transaction_amount
            )));
        }
        Ok(())
    }

    /// Daily cumulative withdrawal cap
    ///
    /// `withdrawn_today` is the absolute sum of today's committed withdrawals.
    pub fn check_daily_cap(
        &self,
        withdrawn_today: Decimal,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let total = checked_add(withdrawn_today, amount)?;
        if total > self.daily_withdrawal_cap {
            return Err(LedgerError::LimitExceeded(format!(
                "daily withdrawal cap {} exceeded: {} already withdrawn today, {} requested",
                self.daily_withdrawal_cap, withdrawn_today, amount
            )));
        }
        Ok(())
    }
}

/// Start of the UTC day containing `at`
pub fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = at.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default();
    DateTime::from_naive_utc_and_offset(midnight, Utc)
}

/// Start of the trailing window of `days` ending at `at`
pub fn trailing_window_start(at: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    at - Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_minimums() {
        let policy = LimitPolicy::default();
        assert!(policy.check_minimum(TransactionKind::Withdrawal, dec(10)).is_ok());
        assert!(matches!(
            policy.check_minimum(TransactionKind::Withdrawal, dec(9)),
            Err(LedgerError::LimitExceeded(_))
        ));
        assert!(policy
            .check_minimum(TransactionKind::InternalTransfer, Decimal::new(5, 1))
            .is_err());
        // deposits have no minimum
        assert!(policy
            .check_minimum(TransactionKind::Deposit, Decimal::new(1, 2))
            .is_ok());
    }

    #[test]
    fn test_maximum() {
        let policy = LimitPolicy::default();
        assert!(policy.check_maximum(dec(10_000_000)).is_ok());
        assert!(matches!(
            policy.check_maximum(dec(10_000_001)),
            Err(LedgerError::Validation(_))
        ));
        assert!(policy.check_maximum(Decimal::MAX).is_err());
    }

    #[test]
    fn test_daily_cap_boundary() {
        let policy = LimitPolicy {
            daily_withdrawal_cap: dec(1000),
            ..LimitPolicy::default()
        };
        assert!(policy.check_daily_cap(dec(400), dec(600)).is_ok());
        assert!(matches!(
            policy.check_daily_cap(dec(400), dec(601)),
            Err(LedgerError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_day_start() {
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 17, 42, 5).unwrap();
        assert_eq!(
            day_start(at),
            Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(
            trailing_window_start(at, 30),
            Utc.with_ymd_and_hms(2026, 9, 15, 17, 42, 5).unwrap()
        );
    }

    #[test]
    fn test_policy_from_yaml() {
        let yaml = "min_withdrawal: 25\nmin_transfer: \"0.5\"\ndaily_withdrawal_cap: 10000\n";
        let policy: LimitPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.min_withdrawal, dec(25));
        assert_eq!(policy.min_transfer, Decimal::new(5, 1));
        assert!(!policy.hold_pending_withdrawals);
        assert_eq!(policy.max_transaction_amount, dec(10_000_000));
    }
}
