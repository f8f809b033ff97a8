//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use utoipa::ToSchema;

use super::super::state::AppState;
use super::super::types::{ApiResponse, error_codes};

/// Health check response data
#[derive(serde::Serialize, serde::Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
    #[schema(example = "memory")]
    pub store: String,
    pub uptime_secs: u64,
}

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {...}}
/// - Unhealthy: 503 Service Unavailable + {code: 5001, msg: "unavailable"}
///
/// Failure details are logged, never returned.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    match state.services.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                store: state.services.store.name().to_string(),
                uptime_secs: state.started_at.elapsed().as_secs(),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "[HEALTH] Store check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    code: error_codes::SERVICE_UNAVAILABLE,
                    msg: "unavailable".to_string(),
                    data: None,
                }),
            )
        }
    }
}
