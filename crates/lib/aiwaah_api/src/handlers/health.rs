//! Liveness endpoint.

use axum::Json;

use crate::models::HealthResponse;

/// `GET /health`: process is up.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: aiwaah_core::version().to_string(),
    })
}
