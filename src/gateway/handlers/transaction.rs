//! Transaction lifecycle handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use validator::Validate;

use super::super::state::AppState;
use super::super::types::{
    ApiResult, ApprovalView, ApproveRequest, CreateTransactionRequest, RejectRequest,
    TransactionView, created, ok,
};
use super::parse_id;
use crate::core_types::{AccountId, TransactionId};
use crate::error::LedgerError;
use crate::money::parse_amount;
use crate::transaction::TransactionRequest;

/// Create a PENDING transaction
///
/// POST /api/v1/transactions
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction created as PENDING", body = TransactionView),
        (status = 400, description = "Invalid request, unknown or ineligible account"),
        (status = 422, description = "Below minimum or over the daily cap")
    ),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTransactionRequest>,
) -> ApiResult<TransactionView> {
    req.validate()?;

    let from = AccountId(req.from_account);
    let currency = state.account_currency(from).await?;
    let amount = parse_amount(&req.amount, currency).map_err(LedgerError::from)?;

    let request = TransactionRequest {
        kind: req.kind,
        from_account: from,
        to_account: req.to_account.map(AccountId),
        amount,
        method: req.method,
        details: req.details,
    };
    let txn = state.services.transactions.create_pending(request).await?;
    created(TransactionView::from(&txn))
}

/// Approve a PENDING transaction and commit its ledger entries
///
/// POST /api/v1/transactions/{id}/approve
#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/approve",
    params(("id" = String, Path, description = "Transaction id (ULID)")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Transaction COMPLETED", body = ApprovalView),
        (status = 404, description = "Unknown transaction"),
        (status = 409, description = "Already finalized or lock timeout"),
        (status = 422, description = "Insufficient funds or limit exceeded"),
        (status = 500, description = "Storage failure; retry with the same key")
    ),
    tag = "Transactions"
)]
pub async fn approve_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<ApprovalView> {
    req.validate()?;
    let id: TransactionId = parse_id(&id, "transaction")?;

    let approval = state
        .services
        .transactions
        .approve(id, &req.actor_id, req.idempotency_key)
        .await?;
    ok(ApprovalView::from(&approval))
}

/// Reject a PENDING transaction (no ledger effect)
///
/// POST /api/v1/transactions/{id}/reject
#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/reject",
    params(("id" = String, Path, description = "Transaction id (ULID)")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Transaction REJECTED", body = TransactionView),
        (status = 404, description = "Unknown transaction"),
        (status = 409, description = "Already finalized")
    ),
    tag = "Transactions"
)]
pub async fn reject_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<TransactionView> {
    req.validate()?;
    let id: TransactionId = parse_id(&id, "transaction")?;

    let txn = state
        .services
        .transactions
        .reject(id, &req.actor_id, req.idempotency_key, &req.reason)
        .await?;
    ok(TransactionView::from(&txn))
}

/// GET /api/v1/transactions/{id}
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    params(("id" = String, Path, description = "Transaction id (ULID)")),
    responses(
        (status = 200, description = "Transaction", body = TransactionView),
        (status = 404, description = "Unknown transaction")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TransactionView> {
    let id: TransactionId = parse_id(&id, "transaction")?;
    let txn = state.services.transactions.get(id).await?;
    ok(TransactionView::from(&txn))
}
