//! Ledger Error Types
//!
//! One error taxonomy for every ledger command. Business-rule failures are
//! returned as typed values so a caller can never mistake a rejected command
//! for a partially applied one.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::money::MoneyError;

/// Ledger error types
///
/// Error codes are stable strings for API responses and alerting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Bad input shape, amount, currency or account eligibility
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient funds on account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: u64,
        available: Decimal,
        requested: Decimal,
    },

    /// Source and destination of a transfer are the same account
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    /// Minimum amount or daily cumulative cap violated
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Accrued amount {amount} is below the payout threshold {threshold}")]
    BelowThreshold { amount: Decimal, threshold: Decimal },

    #[error("Accrual already paid: {0}")]
    AlreadyPaid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Durability failure; nothing of the failed batch is committed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Lock contention timeout, or a row changed under a compare-and-set
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// An amount or balance left the representable `Decimal` range
    #[error("Amount overflow: {0}")]
    Overflow(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::InvalidTransfer(_) => "INVALID_TRANSFER",
            LedgerError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            LedgerError::InvalidState(_) => "INVALID_STATE",
            LedgerError::BelowThreshold { .. } => "BELOW_THRESHOLD",
            LedgerError::AlreadyPaid(_) => "ALREADY_PAID",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            LedgerError::Overflow(_) => "AMOUNT_OVERFLOW",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation(_) | LedgerError::InvalidTransfer(_) => 400,
            LedgerError::NotFound(_) => 404,
            LedgerError::InvalidState(_)
            | LedgerError::AlreadyPaid(_)
            | LedgerError::ConcurrencyConflict(_) => 409,
            LedgerError::InsufficientFunds { .. }
            | LedgerError::LimitExceeded(_)
            | LedgerError::BelowThreshold { .. }
            | LedgerError::Overflow(_) => 422,
            LedgerError::Storage(_) => 500,
        }
    }

    /// Whether retrying the same command (same idempotency key) may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Storage(_) | LedgerError::ConcurrencyConflict(_)
        )
    }

    pub(crate) fn already_finalized(id: impl std::fmt::Display, status: impl std::fmt::Display) -> Self {
        LedgerError::InvalidState(format!(
            "transaction already finalized: {} is {}",
            id, status
        ))
    }
}

impl From<MoneyError> for LedgerError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::Overflow(detail) => LedgerError::Overflow(detail),
            other => LedgerError::Validation(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::InvalidTransfer("same".into()).code(),
            "INVALID_TRANSFER"
        );
        assert_eq!(
            LedgerError::InsufficientFunds {
                account: 1,
                available: Decimal::ZERO,
                requested: Decimal::ONE,
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(LedgerError::Storage("io".into()).code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::Validation("x".into()).http_status(), 400);
        assert_eq!(LedgerError::NotFound("x".into()).http_status(), 404);
        assert_eq!(LedgerError::AlreadyPaid("x".into()).http_status(), 409);
        assert_eq!(LedgerError::LimitExceeded("x".into()).http_status(), 422);
        assert_eq!(LedgerError::Storage("x".into()).http_status(), 500);
    }

    #[test]
    fn test_already_finalized_message() {
        let err = LedgerError::already_finalized("01ABC", "COMPLETED");
        assert_eq!(
            err.to_string(),
            "Invalid state: transaction already finalized: 01ABC is COMPLETED"
        );
    }

    #[test]
    fn test_money_error_maps_to_validation() {
        let err: LedgerError = MoneyError::InvalidAmount.into();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(!err.is_retryable());
        assert!(LedgerError::Storage("x".into()).is_retryable());

        let err: LedgerError = MoneyError::Overflow("a + b".into()).into();
        assert_eq!(err.code(), "AMOUNT_OVERFLOW");
        assert_eq!(err.http_status(), 422);
    }
}
