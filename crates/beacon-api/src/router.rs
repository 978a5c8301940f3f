//! Route definitions for the Beacon HTTP API.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::cors::build_cors_layer;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(presence_routes())
        .merge(health_routes());

    let cors = build_cors_layer(&state.config.server);

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(handlers::ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Presence endpoints
fn presence_routes() -> Router<AppState> {
    Router::new()
        .route("/presence/register", post(handlers::presence::register))
        .route("/presence/verify", post(handlers::presence::verify_batch))
        .route("/presence/ping", post(handlers::presence::ping))
        .route("/presence/offline", post(handlers::presence::go_offline))
        .route("/presence/{identity}", get(handlers::presence::get_status))
}

/// Health check endpoints
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/detailed", get(handlers::health::health_detailed))
}
