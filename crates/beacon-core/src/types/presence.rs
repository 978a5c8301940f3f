//! Persisted presence records and the status views derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ConnectionHandle;
use super::identity::Identity;

/// Coarse, advisory location attributes. Never used for correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationHint {
    /// Country name or code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Region within the country.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl LocationHint {
    /// Build a hint, treating empty strings and `"Unknown"` as absent.
    pub fn from_parts(country: Option<String>, region: Option<String>) -> Option<Self> {
        fn known(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("unknown"))
        }

        let hint = Self {
            country: known(country),
            region: known(region),
        };

        if hint.country.is_none() && hint.region.is_none() {
            None
        } else {
            Some(hint)
        }
    }
}

/// Authoritative, persisted presence state for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Unique key.
    pub identity: Identity,
    /// Last authoritative liveness state.
    pub online: bool,
    /// Last moment liveness was confirmed by any signal.
    pub last_seen: DateTime<Utc>,
    /// Connection currently bound to this identity, if any.
    #[serde(default)]
    pub connection: Option<ConnectionHandle>,
    /// Advisory location.
    #[serde(default)]
    pub location: Option<LocationHint>,
}

impl PresenceRecord {
    /// A freshly registered, offline record.
    pub fn registered(
        identity: Identity,
        now: DateTime<Utc>,
        location: Option<LocationHint>,
    ) -> Self {
        Self {
            identity,
            online: false,
            last_seen: now,
            connection: None,
            location,
        }
    }

    /// Whether `last_seen` is older than `threshold` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now - self.last_seen > threshold
    }

    /// Project the record into a status view.
    pub fn status(&self) -> PresenceStatus {
        PresenceStatus {
            identity: self.identity.clone(),
            online: self.online,
            last_seen: self.last_seen,
        }
    }
}

/// Resolved presence of one identity, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    /// Identity.
    pub identity: Identity,
    /// Online flag.
    pub online: bool,
    /// Last confirmed liveness.
    pub last_seen: DateTime<Utc>,
}

/// Why a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Abrupt transport closure or timeout; may reconnect shortly.
    Transient,
    /// Explicit logout or client-initiated close.
    Intentional,
}

impl CloseReason {
    /// Converts to string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Transient => "transient",
            Self::Intentional => "intentional",
        }
    }
}
