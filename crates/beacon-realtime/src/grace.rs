//! Grace-period bookkeeping for transient disconnects.
//!
//! A pending disconnect carries a generation number. The actor schedules a
//! timer for every pending entry and never cancels it; when the timer fires
//! it only acts if the entry with that generation is still present.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use beacon_core::types::{ConnectionHandle, Identity};

/// A transient close waiting for its grace window to elapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDisconnect {
    /// Handle that closed.
    pub handle: ConnectionHandle,
    /// Wall-clock time of the close.
    pub disconnected_at: DateTime<Utc>,
    /// Monotonic time of the close.
    pub disconnected_instant: Instant,
    /// When the entry resolves.
    pub resolves_at: Instant,
    /// Generation used to discard superseded timers.
    pub generation: u64,
}

/// Pending disconnects keyed by identity.
#[derive(Debug, Default)]
pub struct GraceManager {
    pending: HashMap<Identity, PendingDisconnect>,
    next_generation: u64,
}

impl GraceManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transient close, replacing any earlier pending entry.
    pub fn schedule(
        &mut self,
        identity: &Identity,
        handle: ConnectionHandle,
        disconnected_at: DateTime<Utc>,
        now: Instant,
        grace: std::time::Duration,
    ) -> PendingDisconnect {
        self.next_generation += 1;
        let pending = PendingDisconnect {
            handle,
            disconnected_at,
            disconnected_instant: now,
            resolves_at: now + grace,
            generation: self.next_generation,
        };
        self.pending.insert(identity.clone(), pending.clone());
        pending
    }

    /// Drop the pending entry for `identity`.
    pub fn cancel(&mut self, identity: &Identity) -> Option<PendingDisconnect> {
        self.pending.remove(identity)
    }

    /// Remove and return the entry if `generation` is still current.
    pub fn take_if_current(
        &mut self,
        identity: &Identity,
        generation: u64,
    ) -> Option<PendingDisconnect> {
        match self.pending.get(identity) {
            Some(p) if p.generation == generation => self.pending.remove(identity),
            _ => None,
        }
    }

    /// The pending entry for `identity`.
    pub fn get(&self, identity: &Identity) -> Option<&PendingDisconnect> {
        self.pending.get(identity)
    }

    /// Whether `identity` has an unexpired pending disconnect at `now`.
    pub fn is_within_grace(&self, identity: &Identity, now: Instant) -> bool {
        self.pending
            .get(identity)
            .is_some_and(|p| now < p.resolves_at)
    }

    /// Whether `identity` has any pending disconnect.
    pub fn is_pending(&self, identity: &Identity) -> bool {
        self.pending.contains_key(identity)
    }

    /// Number of pending disconnects.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
