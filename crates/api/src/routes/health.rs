use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use burrow_worker::PoolStats;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `maintenance` once shutdown has been announced.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub maintenance: bool,
    pub workers: PoolStats,
    pub download_jobs: usize,
    pub ws_connections: usize,
}

/// GET /health -- returns service status and pool load.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let maintenance = state.maintenance.is_active();

    Json(HealthResponse {
        status: if maintenance { "maintenance" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        maintenance,
        workers: state.pipeline.pool.stats().await,
        download_jobs: state.pipeline.downloads.job_count().await,
        ws_connections: state.ws_manager.connection_count().await,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
