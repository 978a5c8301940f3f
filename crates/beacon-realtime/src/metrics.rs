//! Engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level metrics counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Inbound events received
    pub events_received: AtomicU64,
    /// Inbound events rejected at the boundary
    pub events_rejected: AtomicU64,
    /// Offline → online transitions
    pub online_transitions: AtomicU64,
    /// Online → offline transitions
    pub offline_transitions: AtomicU64,
    /// Transient closes that entered the grace window
    pub grace_scheduled: AtomicU64,
    /// Pending disconnects cancelled by a reconnect or recent activity
    pub grace_cancelled: AtomicU64,
    /// Pending disconnects that resolved offline
    pub grace_expired: AtomicU64,
    /// Single-identity verifications
    pub verifications: AtomicU64,
    /// Records corrected by batch checks and sweeps
    pub sweep_corrections: AtomicU64,
    /// Coalesced roster broadcasts sent
    pub roster_broadcasts: AtomicU64,
    /// Events dropped by the rate limiter
    pub rate_limited: AtomicU64,
    /// Failed or timed-out store calls
    pub store_errors: AtomicU64,
}

impl EngineMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            online_transitions: self.online_transitions.load(Ordering::Relaxed),
            offline_transitions: self.offline_transitions.load(Ordering::Relaxed),
            grace_scheduled: self.grace_scheduled.load(Ordering::Relaxed),
            grace_cancelled: self.grace_cancelled.load(Ordering::Relaxed),
            grace_expired: self.grace_expired.load(Ordering::Relaxed),
            verifications: self.verifications.load(Ordering::Relaxed),
            sweep_corrections: self.sweep_corrections.load(Ordering::Relaxed),
            roster_broadcasts: self.roster_broadcasts.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Inbound events received
    pub events_received: u64,
    /// Inbound events rejected at the boundary
    pub events_rejected: u64,
    /// Offline → online transitions
    pub online_transitions: u64,
    /// Online → offline transitions
    pub offline_transitions: u64,
    /// Transient closes that entered the grace window
    pub grace_scheduled: u64,
    /// Pending disconnects cancelled
    pub grace_cancelled: u64,
    /// Pending disconnects that resolved offline
    pub grace_expired: u64,
    /// Single-identity verifications
    pub verifications: u64,
    /// Records corrected by batch checks and sweeps
    pub sweep_corrections: u64,
    /// Coalesced roster broadcasts sent
    pub roster_broadcasts: u64,
    /// Events dropped by the rate limiter
    pub rate_limited: u64,
    /// Failed or timed-out store calls
    pub store_errors: u64,
}
