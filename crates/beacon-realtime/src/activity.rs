//! Last activity tracking per identity.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use beacon_core::types::Identity;

/// Tracks when each identity was last active.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    /// Identity → last activity instant
    last_active: HashMap<Identity, Instant>,
}

impl ActivityTracker {
    /// Create a new activity tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity for an identity
    pub fn record(&mut self, identity: &Identity, at: Instant) {
        self.last_active.insert(identity.clone(), at);
    }

    /// Get last activity time for an identity
    pub fn get(&self, identity: &Identity) -> Option<Instant> {
        self.last_active.get(identity).copied()
    }

    /// Remove an identity (on confirmed offline)
    pub fn remove(&mut self, identity: &Identity) {
        self.last_active.remove(identity);
    }

    /// Whether the identity was active strictly after `after` and no longer
    /// than `within` before `now`.
    pub fn active_after(
        &self,
        identity: &Identity,
        after: Instant,
        now: Instant,
        within: Duration,
    ) -> bool {
        self.get(identity)
            .is_some_and(|at| at > after && now.saturating_duration_since(at) <= within)
    }

    /// Identities idle for longer than `timeout`, with their idle time.
    pub fn idle_longer_than(&self, now: Instant, timeout: Duration) -> Vec<(Identity, Duration)> {
        self.last_active
            .iter()
            .filter_map(|(id, at)| {
                let idle = now.saturating_duration_since(*at);
                (idle > timeout).then(|| (id.clone(), idle))
            })
            .collect()
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.last_active.len()
    }

    /// Whether no identity is tracked
    pub fn is_empty(&self) -> bool {
        self.last_active.is_empty()
    }
}
