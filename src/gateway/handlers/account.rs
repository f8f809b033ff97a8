//! Account handlers: provisioning, KYC status, balance

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use validator::Validate;

use super::super::state::AppState;
use super::super::types::{
    AccountView, ApiError, ApiResult, BalanceView, FloatingPnlRequest, OpenAccountRequest,
    SetStatusRequest, created, ok,
};
use crate::account::Account;
use crate::core_types::AccountId;

/// Provision a trading account (called by the provisioning service)
///
/// POST /api/v1/accounts
#[utoipa::path(
    post,
    path = "/api/v1/accounts",
    request_body = OpenAccountRequest,
    responses(
        (status = 201, description = "Account opened ACTIVE with zero balance", body = AccountView),
        (status = 400, description = "Invalid request or duplicate account id")
    ),
    tag = "Accounts"
)]
pub async fn open_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenAccountRequest>,
) -> ApiResult<AccountView> {
    req.validate()?;
    let account = Account::new(
        AccountId(req.account_id),
        req.client_id,
        req.account_type,
        req.currency,
        req.leverage,
    );
    let account = state.services.accounts.open_account(account).await?;
    created(AccountView::from(&account))
}

/// Change account status (KYC gate)
///
/// POST /api/v1/accounts/{id}/status
#[utoipa::path(
    post,
    path = "/api/v1/accounts/{id}/status",
    params(("id" = u64, Path, description = "Account login")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Updated account", body = AccountView),
        (status = 404, description = "Unknown account")
    ),
    tag = "Accounts"
)]
pub async fn set_account_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(req): Json<SetStatusRequest>,
) -> ApiResult<AccountView> {
    let account = state
        .services
        .accounts
        .set_status(AccountId(id), req.status)
        .await?;
    ok(AccountView::from(&account))
}

/// Current balance and equity
///
/// GET /api/v1/accounts/{id}/balance
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}/balance",
    params(("id" = u64, Path, description = "Account login")),
    responses(
        (status = 200, description = "Balance snapshot", body = BalanceView),
        (status = 404, description = "Unknown account")
    ),
    tag = "Accounts"
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<BalanceView> {
    let snapshot = state.services.accounts.snapshot(AccountId(id)).await?;
    ok(BalanceView::from(&snapshot))
}

/// Push floating P/L from the trading bridge
///
/// POST /api/v1/accounts/{id}/floating-pnl
#[utoipa::path(
    post,
    path = "/api/v1/accounts/{id}/floating-pnl",
    params(("id" = u64, Path, description = "Account login")),
    request_body = FloatingPnlRequest,
    responses(
        (status = 200, description = "Balance snapshot with new equity", body = BalanceView),
        (status = 400, description = "Malformed amount"),
        (status = 404, description = "Unknown account")
    ),
    tag = "Accounts"
)]
pub async fn set_floating_pnl(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(req): Json<FloatingPnlRequest>,
) -> ApiResult<BalanceView> {
    req.validate()?;
    let pnl = Decimal::from_str(req.floating_pnl.trim())
        .map_err(|e| ApiError::bad_request(format!("Invalid floating_pnl: {}", e)))?;

    let snapshot = state
        .services
        .accounts
        .set_floating_pnl(AccountId(id), pnl)
        .await?;
    ok(BalanceView::from(&snapshot))
}
