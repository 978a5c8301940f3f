//! Beacon Server: presence reconciliation for real-time messaging.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use beacon_api::{AppState, ConnectionPool, build_router};
use beacon_core::config::AppConfig;
use beacon_core::error::AppError;
use beacon_core::traits::MonotonicClock;
use beacon_realtime::PresenceEngine;
use beacon_store::StoreManager;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("BEACON_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Beacon");

    tracing::info!(provider = %config.store.provider, "Initializing presence store");
    let store = StoreManager::new(&config.store).await?;

    let connections = Arc::new(ConnectionPool::new());
    let (engine, engine_task) = PresenceEngine::spawn(
        config.presence.clone(),
        config.rate_limit.clone(),
        Arc::new(store.clone()),
        Arc::clone(&connections) as Arc<dyn beacon_realtime::Transport>,
        Arc::new(MonotonicClock::new()),
    );

    let config = Arc::new(config);
    let state = AppState::new(
        Arc::clone(&config),
        store,
        engine.clone(),
        Arc::clone(&connections),
    );
    let app = build_router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(%addr, "Beacon listening");

    let shutdown_connections = Arc::clone(&connections);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, closing connections");
            shutdown_connections.close_all();
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // Let close events from the drained sockets reach the engine first.
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    if let Err(e) = engine.shutdown().await {
        tracing::warn!(error = %e, "Presence engine already stopped");
    }
    if tokio::time::timeout(grace, engine_task).await.is_err() {
        tracing::warn!("Presence engine did not stop within the shutdown grace period");
    }

    tracing::info!("Beacon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
