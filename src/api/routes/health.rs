//! Health check endpoint

use crate::api::types::{ApiResponse, HealthResponse};
use axum::Json;

/// GET /api/health/ping
pub async fn ping() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(
        "pong",
        HealthResponse {
            status: "ok".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    ))
}
