//! Health check handlers.

use axum::Json;
use axum::extract::State;

use beacon_core::traits::PresenceStore;

use crate::dto::response::{ApiResponse, DetailedHealthResponse, HealthResponse};
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

/// GET /api/health/detailed
pub async fn health_detailed(
    State(state): State<AppState>,
) -> Json<ApiResponse<DetailedHealthResponse>> {
    let store_ok = state.store.health_check().await.unwrap_or(false);
    let engine = state.engine.snapshot().await.ok();

    let status = if store_ok && engine.is_some() {
        "ok"
    } else {
        "degraded"
    };

    Json(ApiResponse::ok(DetailedHealthResponse {
        status: status.to_string(),
        store: if store_ok { "connected" } else { "unavailable" }.to_string(),
        ws_connections: state.connections.connection_count(),
        connected_identities: state.connections.identity_count(),
        engine,
        metrics: state.engine.metrics(),
    }))
}
