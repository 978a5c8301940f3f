//! Server-side keepalive for WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use beacon_core::config::RealtimeConfig;
use beacon_core::types::CloseReason;
use beacon_realtime::OutboundMessage;

use super::connection::Connection;

/// Heartbeat configuration
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between pings
    pub ping_interval: Duration,
    /// Silence after which the connection is considered dead
    pub ping_timeout: Duration,
}

impl From<&RealtimeConfig> for HeartbeatConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            ping_timeout: config.ping_timeout(),
        }
    }
}

/// Run the heartbeat loop for a connection.
///
/// Sends a `ping` every interval and closes the connection as a transient
/// drop once no inbound frame has arrived within the timeout.
pub async fn run_heartbeat(conn: Arc<Connection>, config: HeartbeatConfig) {
    let mut interval = time::interval_at(
        time::Instant::now() + config.ping_interval,
        config.ping_interval,
    );

    loop {
        tokio::select! {
            _ = conn.closed() => break,
            _ = interval.tick() => {}
        }

        let idle = conn.idle_for().await;
        if idle > config.ping_timeout {
            tracing::warn!(
                conn_id = %conn.id,
                identity = %conn.identity,
                idle_ms = idle.as_millis() as u64,
                "Connection heartbeat timeout"
            );
            conn.close(CloseReason::Transient);
            break;
        }

        let ping = OutboundMessage::Ping {
            timestamp: Utc::now().timestamp_millis(),
        };
        if !conn.send(ping) && !conn.is_alive() {
            break;
        }
    }

    tracing::debug!(conn_id = %conn.id, "Heartbeat loop ended");
}
