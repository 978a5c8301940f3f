//! The WebSocket-backed transport the presence engine talks to.

pub mod connection;
pub mod heartbeat;
pub mod pool;

pub use connection::Connection;
pub use heartbeat::{HeartbeatConfig, run_heartbeat};
pub use pool::ConnectionPool;
