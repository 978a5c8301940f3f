//! Presence reconciliation timings.
//!
//! The defaults are the empirically chosen values of the service. They are
//! tunable but fixed for the lifetime of the engine, never per call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing constants for grace periods, verification and coalescing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Delay before a transient disconnect becomes an offline transition.
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
    /// Activity newer than this (and after the disconnect) cancels a
    /// pending offline transition at expiry.
    #[serde(default = "default_recency_threshold")]
    pub recency_threshold_seconds: u64,
    /// Age of `last_seen` after which an unbound online record is suspect.
    #[serde(default = "default_staleness_threshold")]
    pub staleness_threshold_seconds: u64,
    /// Interval of the backstop sweep over online records.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Coalescing window for `roster_changed` broadcasts, in milliseconds.
    #[serde(default = "default_coalesce_window")]
    pub coalesce_window_ms: u64,
    /// Minimum spacing between `last_seen` writes caused by heartbeats.
    #[serde(default = "default_liveness_write_interval")]
    pub liveness_write_interval_seconds: u64,
    /// Bound sessions with no activity for this long are expired.
    #[serde(default = "default_idle_session_timeout")]
    pub idle_session_timeout_seconds: u64,
    /// Interval of the idle-session expiry check.
    #[serde(default = "default_idle_sweep_interval")]
    pub idle_sweep_interval_seconds: u64,
    /// Upper bound on a single store call, in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    /// Capacity of the engine's command queue.
    #[serde(default = "default_command_buffer")]
    pub command_buffer_size: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            grace_period_seconds: default_grace_period(),
            recency_threshold_seconds: default_recency_threshold(),
            staleness_threshold_seconds: default_staleness_threshold(),
            sweep_interval_seconds: default_sweep_interval(),
            coalesce_window_ms: default_coalesce_window(),
            liveness_write_interval_seconds: default_liveness_write_interval(),
            idle_session_timeout_seconds: default_idle_session_timeout(),
            idle_sweep_interval_seconds: default_idle_sweep_interval(),
            store_timeout_ms: default_store_timeout(),
            command_buffer_size: default_command_buffer(),
        }
    }
}

impl PresenceConfig {
    /// Grace window.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }

    /// Recency threshold.
    pub fn recency_threshold(&self) -> Duration {
        Duration::from_secs(self.recency_threshold_seconds)
    }

    /// Staleness threshold as a chrono duration, for `last_seen` comparisons.
    pub fn staleness_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_threshold_seconds as i64)
    }

    /// Sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Coalescing window.
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    /// Heartbeat write spacing.
    pub fn liveness_write_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_write_interval_seconds)
    }

    /// Idle-session timeout.
    pub fn idle_session_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_session_timeout_seconds)
    }

    /// Idle sweep interval.
    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_interval_seconds)
    }

    /// Store call timeout.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn default_grace_period() -> u64 {
    10
}

fn default_recency_threshold() -> u64 {
    60
}

fn default_staleness_threshold() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_coalesce_window() -> u64 {
    500
}

fn default_liveness_write_interval() -> u64 {
    15
}

fn default_idle_session_timeout() -> u64 {
    30 * 60
}

fn default_idle_sweep_interval() -> u64 {
    5 * 60
}

fn default_store_timeout() -> u64 {
    2_000
}

fn default_command_buffer() -> usize {
    1024
}
