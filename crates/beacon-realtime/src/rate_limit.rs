//! Per-identity sliding-window rate limiter.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use beacon_core::config::RateLimitConfig;
use beacon_core::types::Identity;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The event is admitted and counted.
    Admitted,
    /// The event is dropped.
    Rejected {
        /// Time until the oldest admitted event leaves the window.
        retry_after: Duration,
        /// First rejection in this window; the caller logs it.
        warn: bool,
    },
}

impl Admission {
    /// Whether the event was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug, Default)]
struct RateWindow {
    admitted: VecDeque<Instant>,
    last_warned: Option<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admitted.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window admission control keyed by identity.
///
/// Only admitted events consume quota.
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<Identity, RateWindow>,
    max_events: usize,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter admitting `max_events` per `window`.
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            max_events,
            window,
        }
    }

    /// Creates a limiter from configuration.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_events, config.window())
    }

    /// Attempts to admit one event for `identity` at `now`.
    pub fn admit(&mut self, identity: &Identity, now: Instant) -> Admission {
        let window = self.window;
        let entry = self.windows.entry(identity.clone()).or_default();
        entry.prune(now, window);

        if entry.admitted.len() < self.max_events {
            entry.admitted.push_back(now);
            return Admission::Admitted;
        }

        let retry_after = entry
            .admitted
            .front()
            .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(window);

        let warn = entry
            .last_warned
            .is_none_or(|at| now.saturating_duration_since(at) >= window);
        if warn {
            entry.last_warned = Some(now);
        }

        Admission::Rejected { retry_after, warn }
    }

    /// Drops windows holding only expired entries. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let window = self.window;
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            w.prune(now, window);
            let warned_recently = w
                .last_warned
                .is_some_and(|at| now.saturating_duration_since(at) < window);
            !w.admitted.is_empty() || warned_recently
        });
        before - self.windows.len()
    }

    /// Number of tracked windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no window is tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
