//! Health check handlers for liveness and readiness probes.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::error;

use crate::server::ApiState;

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
}

/// Basic health check.
///
/// Returns 200 as long as the process is serving requests.
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Liveness probe.
///
/// Always healthy while the process runs; restarts are driven by the
/// orchestrator when this stops answering.
pub async fn liveness_check() -> impl IntoResponse {
    Json(HealthResponse { status: "alive" })
}

/// Readiness probe.
///
/// Verifies database connectivity; not ready when the pool cannot serve a
/// trivial query.
pub async fn readiness_check(State(state): State<ApiState>) -> impl IntoResponse {
    match state.storage.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ready" })),
        Err(err) => {
            error!(error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { status: "not ready" }))
        },
    }
}
