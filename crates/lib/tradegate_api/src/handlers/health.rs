//! Liveness and readiness probes.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::AppState;
use crate::gateway::health::Readiness;
use crate::models::HealthResponse;

/// `GET /health`: the gateway process is up.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
    })
}

/// `GET /ready`: every backend answers its own health probe.
pub async fn ready_handler(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let readiness = state.health.check_all().await;
    let status = if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}
