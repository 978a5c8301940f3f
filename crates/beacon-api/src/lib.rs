//! # beacon-api
//!
//! HTTP and WebSocket gateway for Beacon built on Axum.
//!
//! Owns the concrete transport (a pool of WebSocket connections with a
//! server-side heartbeat), maps socket lifecycle to presence engine events,
//! and exposes the REST presence and health endpoints.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod transport;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
pub use transport::ConnectionPool;
