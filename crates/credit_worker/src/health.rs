//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use core_kernel::{AdapterHealth, HealthCheckResult};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Sweeps registered with the scheduler
    pub tasks: Vec<&'static str>,
}

/// Liveness: the process is up
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tasks: state.tasks.to_vec(),
    })
}

/// Readiness: the store answers
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthCheckResult>) {
    let result = state.store.health_check().await;
    let code = match result.status {
        AdapterHealth::Healthy | AdapterHealth::Degraded => StatusCode::OK,
        AdapterHealth::Unhealthy => {
            tracing::warn!(
                adapter = %result.adapter_id,
                message = ?result.message,
                "health.not_ready"
            );
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (code, Json(result))
}
