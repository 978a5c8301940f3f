//! Coalescing of roster notifications.

use std::collections::HashSet;

use beacon_core::types::Identity;

/// Pending roster changes plus a single armed-timer flag.
///
/// The owner arms one timer when [`schedule`](Self::schedule) returns `true`
/// and calls [`flush`](Self::flush) when it fires.
#[derive(Debug, Default)]
pub struct ThrottledBroadcast {
    pending: HashSet<Identity>,
    armed: bool,
}

impl ThrottledBroadcast {
    /// Create an idle dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `identity`. Returns `true` if the caller must arm the timer.
    pub fn schedule(&mut self, identity: &Identity) -> bool {
        self.pending.insert(identity.clone());
        if self.armed {
            false
        } else {
            self.armed = true;
            true
        }
    }

    /// Drain the window. Returns the number of distinct changed identities,
    /// or `None` if nothing is pending.
    pub fn flush(&mut self) -> Option<usize> {
        self.armed = false;
        if self.pending.is_empty() {
            return None;
        }
        let changed = self.pending.len();
        self.pending.clear();
        Some(changed)
    }

    /// Whether a flush timer is armed.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Identities waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
