//! IB commission handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use validator::Validate;

use super::super::state::AppState;
use super::super::types::{
    AccrualStateView, AccrualView, AccrueCommissionRequest, ApiResult, IbView, PayoutView,
    ProcessPayoutRequest, RegisterIbRequest, created, ok,
};
use super::parse_id;
use crate::commission::Period;
use crate::core_types::{AccountId, AccrualId, IbId};
use crate::error::LedgerError;
use crate::money::parse_amount;

/// Register an introducing broker and its payout account
///
/// POST /api/v1/ibs
#[utoipa::path(
    post,
    path = "/api/v1/ibs",
    request_body = RegisterIbRequest,
    responses(
        (status = 201, description = "IB registered", body = IbView),
        (status = 400, description = "Unknown payout account or wrong currency")
    ),
    tag = "Commissions"
)]
pub async fn register_ib(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterIbRequest>,
) -> ApiResult<IbView> {
    let profile = state
        .services
        .commissions
        .register_ib(IbId(req.ib_id), AccountId(req.payout_account))
        .await?;
    created(IbView::from(&profile))
}

/// Accrue commission for newly reported referred volume
///
/// POST /api/v1/commissions/accrue
#[utoipa::path(
    post,
    path = "/api/v1/commissions/accrue",
    request_body = AccrueCommissionRequest,
    responses(
        (status = 200, description = "Commission accrued", body = AccrualView),
        (status = 400, description = "Invalid period or volume"),
        (status = 404, description = "IB not registered")
    ),
    tag = "Commissions"
)]
pub async fn accrue_commission(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccrueCommissionRequest>,
) -> ApiResult<AccrualView> {
    req.validate()?;
    let engine = &state.services.commissions;
    let currency = engine.policy().currency;
    let period: Period = req.period.parse()?;
    let volume = parse_amount(&req.volume, currency).map_err(LedgerError::from)?;

    let outcome = engine.accrue(IbId(req.ib_id), period, volume).await?;
    ok(AccrualView::new(&outcome, currency))
}

/// GET /api/v1/commissions/accruals/{id}
#[utoipa::path(
    get,
    path = "/api/v1/commissions/accruals/{id}",
    params(("id" = String, Path, description = "Accrual id (ULID)")),
    responses(
        (status = 200, description = "Accrual", body = AccrualStateView),
        (status = 404, description = "Unknown accrual")
    ),
    tag = "Commissions"
)]
pub async fn get_accrual(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<AccrualStateView> {
    let id: AccrualId = parse_id(&id, "accrual")?;
    let accrual = state.services.commissions.accrual(id).await?;
    ok(AccrualStateView::from(&accrual))
}

/// Pay an accrual out to the IB's trading account
///
/// POST /api/v1/commissions/payouts/{id}/process
#[utoipa::path(
    post,
    path = "/api/v1/commissions/payouts/{id}/process",
    params(("id" = String, Path, description = "Accrual id (ULID)")),
    request_body = ProcessPayoutRequest,
    responses(
        (status = 200, description = "Payout committed", body = PayoutView),
        (status = 404, description = "Unknown accrual"),
        (status = 409, description = "Already paid"),
        (status = 422, description = "Below payout threshold")
    ),
    tag = "Commissions"
)]
pub async fn process_payout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ProcessPayoutRequest>,
) -> ApiResult<PayoutView> {
    req.validate()?;
    let id: AccrualId = parse_id(&id, "accrual")?;
    let payout = state
        .services
        .commissions
        .process_payout(id, &req.actor_id, req.idempotency_key)
        .await?;
    ok(PayoutView::from(&payout))
}
