//! Request DTOs.
//!
//! Identities arrive as plain strings and are parsed in the handlers so a
//! malformed one yields the standard validation error body.

use serde::{Deserialize, Serialize};

/// Register request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Identity to register.
    pub identity: String,
    /// Country hint.
    #[serde(default)]
    pub country: Option<String>,
    /// Region hint.
    #[serde(default)]
    pub region: Option<String>,
}

/// Body naming a single identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRequest {
    /// Identity.
    pub identity: String,
}

/// Batch verification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyBatchRequest {
    /// Identities to check for stale online claims.
    pub identities: Vec<String>,
    /// Identity to notify of corrections, if it is connected.
    #[serde(default)]
    pub requester: Option<String>,
}

/// WebSocket upgrade query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsQuery {
    /// Identity declared by the client.
    pub identity: String,
    /// Country hint.
    #[serde(default)]
    pub country: Option<String>,
    /// Region hint.
    #[serde(default)]
    pub region: Option<String>,
}
