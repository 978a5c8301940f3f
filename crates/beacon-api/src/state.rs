//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use beacon_core::config::AppConfig;
use beacon_realtime::PresenceEngine;
use beacon_store::StoreManager;

use crate::transport::ConnectionPool;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Persisted presence store
    pub store: StoreManager,
    /// Presence engine handle
    pub engine: PresenceEngine,
    /// Live WebSocket connections
    pub connections: Arc<ConnectionPool>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Assemble the state.
    pub fn new(
        config: Arc<AppConfig>,
        store: StoreManager,
        engine: PresenceEngine,
        connections: Arc<ConnectionPool>,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            connections,
            started_at: Instant::now(),
        }
    }
}
