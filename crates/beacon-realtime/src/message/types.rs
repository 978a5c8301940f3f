//! Inbound and outbound message type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use beacon_core::types::Identity;

/// Frames sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Liveness signal.
    Heartbeat,
    /// Ask for the verified status of one identity.
    Verify {
        /// Identity to verify.
        identity: String,
    },
    /// Ask for a staleness check over a list of identities.
    VerifyBatch {
        /// Identities to check.
        identities: Vec<String>,
    },
    /// The client is going offline on purpose.
    GoingOffline,
    /// A rate-limited application event.
    Send {
        /// Application event type.
        event_type: String,
        /// Optional recipient identity.
        #[serde(default)]
        to: Option<String>,
        /// Opaque payload.
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Messages sent by the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// An identity came online.
    PresenceOnline {
        /// Identity.
        identity: Identity,
        /// Last confirmed liveness.
        last_seen: DateTime<Utc>,
    },
    /// An identity went offline.
    PresenceOffline {
        /// Identity.
        identity: Identity,
        /// Last confirmed liveness.
        last_seen: DateTime<Utc>,
    },
    /// Verified status, in reply to a request.
    PresenceStatus {
        /// Identity.
        identity: Identity,
        /// Online flag.
        online: bool,
        /// Last confirmed liveness.
        last_seen: DateTime<Utc>,
    },
    /// Coalesced notice that the roster changed.
    RosterChanged {
        /// Number of identities whose presence changed in the window.
        changed: usize,
    },
    /// The identity has no presence record.
    IdentityNotFound {
        /// Requested identity.
        identity: String,
    },
    /// The session was closed for inactivity.
    SessionExpired {
        /// Seconds since the last activity.
        idle_seconds: u64,
    },
    /// The event was dropped by the rate limiter.
    RateLimited {
        /// Milliseconds until the oldest admitted event leaves the window.
        retry_after_ms: u64,
    },
    /// The event was admitted.
    EventAccepted {
        /// Application event type.
        event_type: String,
    },
    /// An event relayed from another identity.
    RelayedEvent {
        /// Sender.
        from: Identity,
        /// Application event type.
        event_type: String,
        /// Opaque payload.
        payload: serde_json::Value,
    },
    /// Server keepalive.
    Ping {
        /// Server timestamp (unix millis).
        timestamp: i64,
    },
    /// Error message.
    Error {
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },
}

impl OutboundMessage {
    /// Wire name of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PresenceOnline { .. } => "presence_online",
            Self::PresenceOffline { .. } => "presence_offline",
            Self::PresenceStatus { .. } => "presence_status",
            Self::RosterChanged { .. } => "roster_changed",
            Self::IdentityNotFound { .. } => "identity_not_found",
            Self::SessionExpired { .. } => "session_expired",
            Self::RateLimited { .. } => "rate_limited",
            Self::EventAccepted { .. } => "event_accepted",
            Self::RelayedEvent { .. } => "relayed_event",
            Self::Ping { .. } => "ping",
            Self::Error { .. } => "error",
        }
    }

    /// Build an error message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
