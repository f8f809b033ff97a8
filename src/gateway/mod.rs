//! HTTP gateway
//!
//! JSON over HTTP in the `{code, msg, data}` envelope. Actor ids arrive in
//! the request body; the gateway itself performs no authentication.

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::GatewayConfig;
use crate::services::LedgerServices;
use state::AppState;

/// Build the router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        // Transactions
        .route("/api/v1/transactions", post(handlers::create_transaction))
        .route("/api/v1/transactions/{id}", get(handlers::get_transaction))
        .route(
            "/api/v1/transactions/{id}/approve",
            post(handlers::approve_transaction),
        )
        .route(
            "/api/v1/transactions/{id}/reject",
            post(handlers::reject_transaction),
        )
        // Accounts
        .route("/api/v1/accounts", post(handlers::open_account))
        .route("/api/v1/accounts/{id}/balance", get(handlers::get_balance))
        .route(
            "/api/v1/accounts/{id}/status",
            post(handlers::set_account_status),
        )
        .route(
            "/api/v1/accounts/{id}/floating-pnl",
            post(handlers::set_floating_pnl),
        )
        // Commissions
        .route("/api/v1/ibs", post(handlers::register_ib))
        .route(
            "/api/v1/commissions/accrue",
            post(handlers::accrue_commission),
        )
        .route(
            "/api/v1/commissions/accruals/{id}",
            get(handlers::get_accrual),
        )
        .route(
            "/api/v1/commissions/payouts/{id}/process",
            post(handlers::process_payout),
        )
        .with_state(state)
        // stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve the gateway until the listener fails
pub async fn run_server(config: &GatewayConfig, services: LedgerServices) -> std::io::Result<()> {
    let state = Arc::new(AppState::new(services));
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(addr = %addr, "Gateway listening");
    info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app).await
}
