//! Resolution rules for active verification and staleness sweeps.
//!
//! These are pure functions over a snapshot of engine state; the actor
//! applies the result after re-checking that nothing changed meanwhile.

use chrono::{DateTime, Utc};

use beacon_core::types::{ConnectionHandle, Identity, PresenceRecord, PresenceStatus};

use crate::grace::PendingDisconnect;

/// Answer to a single-identity verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The identity has a record; this is its resolved status.
    Found(PresenceStatus),
    /// No record exists for the identity.
    NotFound,
}

impl VerifyOutcome {
    /// The resolved status, if found.
    pub fn status(&self) -> Option<&PresenceStatus> {
        match self {
            Self::Found(status) => Some(status),
            Self::NotFound => None,
        }
    }
}

/// What a transport probe says about one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResolution {
    /// The bound handle is live.
    Confirmed(ConnectionHandle),
    /// Another live connection declares the identity and should be bound.
    Rebind {
        /// Handle to bind.
        handle: ConnectionHandle,
        /// Bound handle that turned out dead, to unbind first.
        stale: Option<ConnectionHandle>,
    },
    /// No live connection for the identity.
    Gone {
        /// Bound handle that turned out dead, to unbind.
        stale: Option<ConnectionHandle>,
    },
}

/// Resolve an identity against the transport's live connections.
///
/// The bound handle wins when it is live; otherwise the first live
/// connection declaring the identity is adopted.
pub fn resolve_probe(
    identity: &Identity,
    bound: Option<ConnectionHandle>,
    live: &[(Identity, ConnectionHandle)],
) -> ProbeResolution {
    if let Some(handle) = bound {
        if live.iter().any(|(_, h)| *h == handle) {
            return ProbeResolution::Confirmed(handle);
        }
    }

    match live.iter().find(|(id, _)| id == identity) {
        Some((_, handle)) => ProbeResolution::Rebind {
            handle: *handle,
            stale: bound,
        },
        None => ProbeResolution::Gone { stale: bound },
    }
}

/// Whether an unbound, non-pending record claims online but is stale.
pub fn needs_correction(
    record: &PresenceRecord,
    bound: bool,
    pending: bool,
    now: DateTime<Utc>,
    staleness: chrono::Duration,
) -> bool {
    !bound && !pending && record.online && record.is_stale(now, staleness)
}

/// `last_seen` for a record verification found without a live connection.
///
/// A pending disconnect whose window lapsed before its timer fired keeps
/// the disconnect time, as grace expiry would.
pub fn offline_last_seen(
    record: &PresenceRecord,
    pending: Option<&PendingDisconnect>,
) -> DateTime<Utc> {
    pending.map_or(record.last_seen, |p| p.disconnected_at)
}
