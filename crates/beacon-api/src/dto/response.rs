//! Response DTOs.

use serde::{Deserialize, Serialize};

use beacon_core::types::PresenceStatus;
use beacon_realtime::{EngineSnapshot, MetricsSnapshot};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Simple message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Message.
    pub message: String,
}

/// Batch verification result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyBatchResponse {
    /// Statuses that were corrected to offline.
    pub corrected: Vec<PresenceStatus>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
}

/// Detailed health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    /// Overall status.
    pub status: String,
    /// Store status.
    pub store: String,
    /// Open WebSocket connections.
    pub ws_connections: usize,
    /// Distinct identities with an open WebSocket.
    pub connected_identities: usize,
    /// Engine state, absent if the engine is not running.
    pub engine: Option<EngineSnapshot>,
    /// Engine counters.
    pub metrics: MetricsSnapshot,
}
