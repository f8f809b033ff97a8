//! Gateway request/response types
//!
//! - `ApiResponse<T>`: `{code, msg, data}` envelope
//! - `ApiError`: error half of the envelope, built from `LedgerError`
//! - Request DTOs (amounts travel as strings) and response views

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::account::{Account, AccountStatus, AccountType, BalanceSnapshot};
use crate::commission::{AccrualOutcome, CommissionAccrual, IbProfile, Payout};
use crate::error::LedgerError;
use crate::ledger::LedgerEntry;
use crate::money::{Currency, format_amount};
use crate::transaction::{Approval, Transaction, TransactionKind};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_FUNDS: i32 = 1002;
    pub const INVALID_TRANSFER: i32 = 1003;
    pub const LIMIT_EXCEEDED: i32 = 1004;
    pub const BELOW_THRESHOLD: i32 = 1005;
    pub const AMOUNT_OVERFLOW: i32 = 1006;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;
    pub const INVALID_STATE: i32 = 4091;
    pub const ALREADY_PAID: i32 = 4092;
    pub const CONCURRENCY_CONFLICT: i32 = 4093;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

pub fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            msg,
        )
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let code = match &e {
            LedgerError::Validation(_) => error_codes::INVALID_PARAMETER,
            LedgerError::InsufficientFunds { .. } => error_codes::INSUFFICIENT_FUNDS,
            LedgerError::InvalidTransfer(_) => error_codes::INVALID_TRANSFER,
            LedgerError::LimitExceeded(_) => error_codes::LIMIT_EXCEEDED,
            LedgerError::BelowThreshold { .. } => error_codes::BELOW_THRESHOLD,
            LedgerError::NotFound(_) => error_codes::NOT_FOUND,
            LedgerError::InvalidState(_) => error_codes::INVALID_STATE,
            LedgerError::AlreadyPaid(_) => error_codes::ALREADY_PAID,
            LedgerError::ConcurrencyConflict(_) => error_codes::CONCURRENCY_CONFLICT,
            LedgerError::Overflow(_) => error_codes::AMOUNT_OVERFLOW,
            LedgerError::Storage(_) => error_codes::INTERNAL_ERROR,
        };
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %e, code = e.code(), "Request failed");
        }
        Self::new(status, code, e.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.msg)),
        )
            .into_response()
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Create a PENDING deposit, withdrawal or internal transfer
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTransactionRequest {
    #[schema(value_type = String, example = "DEPOSIT")]
    pub kind: TransactionKind,
    /// Account credited by deposits, debited by withdrawals and transfers
    #[schema(example = 1001)]
    pub from_account: u64,
    /// Destination of an internal transfer
    pub to_account: Option<u64>,
    #[schema(example = "500.00")]
    #[validate(length(min = 1, max = 40))]
    pub amount: String,
    #[schema(example = "bank_wire")]
    #[validate(length(min = 1, max = 64))]
    pub method: String,
    #[validate(length(max = 512))]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ApproveRequest {
    #[schema(example = "ops:alice")]
    #[validate(length(min = 1, max = 128))]
    pub actor_id: String,
    /// Defaults to `{transaction_id}:COMPLETED`
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RejectRequest {
    #[validate(length(min = 1, max = 128))]
    pub actor_id: String,
    #[schema(example = "KYC documents expired")]
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
    /// Defaults to `{transaction_id}:REJECTED`
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct OpenAccountRequest {
    #[schema(example = 1001)]
    pub account_id: u64,
    pub client_id: u64,
    #[schema(value_type = String, example = "LIVE")]
    pub account_type: AccountType,
    #[schema(value_type = String, example = "USD")]
    pub currency: Currency,
    #[schema(example = 100)]
    #[validate(range(min = 1, max = 1000))]
    pub leverage: u32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    #[schema(value_type = String, example = "SUSPENDED")]
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct FloatingPnlRequest {
    /// Signed floating P/L of open positions
    #[schema(example = "-125.40")]
    #[validate(length(min = 1, max = 40))]
    pub floating_pnl: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterIbRequest {
    #[schema(example = 77)]
    pub ib_id: u64,
    #[schema(example = 5001)]
    pub payout_account: u64,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AccrueCommissionRequest {
    pub ib_id: u64,
    /// Accrual period, `YYYY-MM`
    #[schema(example = "2026-10")]
    #[validate(length(equal = 7))]
    pub period: String,
    /// Newly reported referred volume
    #[schema(example = "200000")]
    #[validate(length(min = 1, max = 40))]
    pub volume: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ProcessPayoutRequest {
    #[validate(length(min = 1, max = 128))]
    pub actor_id: String,
    /// Defaults to `payout:{accrual_id}`
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

// ============================================================================
// Response views
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    #[schema(example = "01JAE8Q0Y1M5ZK9T3XW4B2C6DN")]
    pub transaction_id: String,
    #[schema(example = "DEPOSIT")]
    pub kind: String,
    #[schema(example = "PENDING")]
    pub status: String,
    pub accounts: Vec<u64>,
    #[schema(example = "500.00")]
    pub amount: String,
    pub currency: String,
    pub method: String,
    pub details: Option<String>,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Transaction> for TransactionView {
    fn from(txn: &Transaction) -> Self {
        Self {
            transaction_id: txn.id.to_string(),
            kind: txn.kind().to_string(),
            status: txn.status.to_string(),
            accounts: txn.legs.accounts().into_iter().map(|a| a.0).collect(),
            amount: format_amount(txn.amount, txn.currency),
            currency: txn.currency.to_string(),
            method: txn.method.clone(),
            details: txn.details.clone(),
            actor_id: txn.actor_id.clone(),
            reason: txn.reason.clone(),
            idempotency_key: txn.idempotency_key.clone(),
            created_at: txn.created_at.to_rfc3339(),
            updated_at: txn.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntryView {
    pub entry_id: String,
    pub account_id: u64,
    /// Signed amount: positive credits, negative debits
    #[schema(example = "500.00")]
    pub amount: String,
    pub kind: String,
}

impl From<&LedgerEntry> for EntryView {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            entry_id: entry.id.to_string(),
            account_id: entry.account_id.0,
            amount: format_amount(entry.amount, entry.currency),
            kind: entry.kind.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalView {
    pub transaction: TransactionView,
    pub committed_entries: Vec<EntryView>,
}

impl From<&Approval> for ApprovalView {
    fn from(approval: &Approval) -> Self {
        Self {
            transaction: TransactionView::from(&approval.transaction),
            committed_entries: approval.committed_entries.iter().map(EntryView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountView {
    pub account_id: u64,
    pub client_id: u64,
    pub account_type: String,
    pub currency: String,
    pub leverage: u32,
    pub status: String,
    pub created_at: String,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id.0,
            client_id: account.client_id,
            account_type: account.account_type.to_string(),
            currency: account.currency.to_string(),
            leverage: account.leverage,
            status: account.status.to_string(),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceView {
    pub account_id: u64,
    #[schema(example = "1500.00")]
    pub balance: String,
    #[schema(example = "1374.60")]
    pub equity: String,
    pub currency: String,
}

impl From<&BalanceSnapshot> for BalanceView {
    fn from(s: &BalanceSnapshot) -> Self {
        Self {
            account_id: s.account_id.0,
            balance: format_amount(s.balance, s.currency),
            equity: format_amount(s.equity, s.currency),
            currency: s.currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IbView {
    pub ib_id: u64,
    pub payout_account: u64,
    pub created_at: String,
}

impl From<&IbProfile> for IbView {
    fn from(p: &IbProfile) -> Self {
        Self {
            ib_id: p.ib_id.0,
            payout_account: p.payout_account.0,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccrualView {
    pub accrual_id: String,
    #[schema(example = "GOLD")]
    pub tier: String,
    /// Commission added by this call
    pub accrued: String,
    /// Unpaid total for the period
    pub pending_amount: String,
    pub trailing_volume: String,
}

impl AccrualView {
    pub fn new(outcome: &AccrualOutcome, currency: Currency) -> Self {
        Self {
            accrual_id: outcome.accrual_id.to_string(),
            tier: outcome.tier.as_str().to_string(),
            accrued: format_amount(outcome.accrued, currency),
            pending_amount: format_amount(outcome.pending_amount, currency),
            trailing_volume: outcome.trailing_volume.normalize().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccrualStateView {
    pub accrual_id: String,
    pub ib_id: u64,
    pub period: String,
    pub amount: String,
    pub currency: String,
    pub paid: bool,
    pub paid_at: Option<String>,
    pub payout_transaction_id: Option<String>,
}

impl From<&CommissionAccrual> for AccrualStateView {
    fn from(a: &CommissionAccrual) -> Self {
        Self {
            accrual_id: a.id.to_string(),
            ib_id: a.ib_id.0,
            period: a.period.to_string(),
            amount: format_amount(a.amount, a.currency),
            currency: a.currency.to_string(),
            paid: a.paid,
            paid_at: a.paid_at.map(|t| t.to_rfc3339()),
            payout_transaction_id: a.payout_transaction_id.map(|t| t.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PayoutView {
    pub accrual_id: String,
    pub ib_id: u64,
    pub period: String,
    pub transaction_id: String,
    pub amount: String,
    pub currency: String,
    #[schema(example = "PAID")]
    pub status: String,
    pub paid_at: String,
}

impl From<&Payout> for PayoutView {
    fn from(p: &Payout) -> Self {
        Self {
            accrual_id: p.accrual_id.to_string(),
            ib_id: p.ib_id.0,
            period: p.period.to_string(),
            transaction_id: p.transaction_id.to_string(),
            amount: format_amount(p.amount, p.currency),
            currency: p.currency.to_string(),
            status: "PAID".to_string(),
            paid_at: p.paid_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_ledger_error_maps_to_envelope() {
        let err: ApiError = LedgerError::InsufficientFunds {
            account: 1001,
            available: Decimal::new(100, 0),
            requested: Decimal::new(500, 0),
        }
        .into();
        assert_eq!(err.code, error_codes::INSUFFICIENT_FUNDS);
        assert_eq!(err.status.as_u16(), 422);
        assert!(err.msg.contains("1001"));

        let err: ApiError = LedgerError::NotFound("transaction x".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_create_request_validation() {
        let req: CreateTransactionRequest = serde_json::from_str(
            r#"{"kind":"WITHDRAWAL","from_account":1,"amount":"","method":"card"}"#,
        )
        .unwrap();
        assert_eq!(req.kind, TransactionKind::Withdrawal);
        assert!(req.validate().is_err());

        assert!(
            serde_json::from_str::<CreateTransactionRequest>(
                r#"{"kind":"LOAN","from_account":1,"amount":"1","method":"card"}"#
            )
            .is_err()
        );
    }
}
