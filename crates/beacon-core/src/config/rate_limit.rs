//! Inbound event rate limiting configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sliding-window admission settings, applied per identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum admitted events per window.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// Window length in seconds.
    #[serde(default = "default_window")]
    pub window_seconds: u64,
    /// How often idle windows are garbage-collected, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            window_seconds: default_window(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl RateLimitConfig {
    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn default_max_events() -> usize {
    10
}

fn default_window() -> u64 {
    10
}

fn default_sweep_interval() -> u64 {
    15 * 60
}
