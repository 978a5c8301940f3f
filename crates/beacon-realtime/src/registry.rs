//! Session registry: identity → currently bound connection handle.

use std::collections::HashMap;

use beacon_core::types::{ConnectionHandle, Identity};

/// In-memory index of bound sessions.
///
/// The persisted record stays authoritative; this is a cache of which
/// connection last spoke for each identity.
///
/// Every change to an identity's binding bumps its epoch, so work started
/// against one binding can tell whether it still applies.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    bound: HashMap<Identity, ConnectionHandle>,
    /// Identity → version of its last binding change. Entries outlive the
    /// binding so an unbind followed by a rebind never repeats an epoch.
    epochs: HashMap<Identity, u64>,
    next_epoch: u64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `identity`, returning the handle it replaced.
    ///
    /// Last bind wins. The replaced connection is not closed.
    pub fn bind(&mut self, identity: &Identity, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.bump(identity);
        self.bound.insert(identity.clone(), handle)
    }

    /// The handle bound to `identity`, if any.
    pub fn lookup(&self, identity: &Identity) -> Option<ConnectionHandle> {
        self.bound.get(identity).copied()
    }

    /// Remove the binding only if `handle` is still the bound one.
    pub fn unbind(&mut self, identity: &Identity, handle: ConnectionHandle) -> bool {
        match self.bound.get(identity) {
            Some(current) if *current == handle => {
                self.bound.remove(identity);
                self.bump(identity);
                true
            }
            _ => false,
        }
    }

    /// Remove whatever is bound to `identity`.
    pub fn remove(&mut self, identity: &Identity) -> Option<ConnectionHandle> {
        let removed = self.bound.remove(identity);
        if removed.is_some() {
            self.bump(identity);
        }
        removed
    }

    /// Version of the binding for `identity`. Zero if it was never bound.
    pub fn epoch(&self, identity: &Identity) -> u64 {
        self.epochs.get(identity).copied().unwrap_or(0)
    }

    fn bump(&mut self, identity: &Identity) {
        self.next_epoch += 1;
        self.epochs.insert(identity.clone(), self.next_epoch);
    }

    /// Whether `identity` has a bound session.
    pub fn is_bound(&self, identity: &Identity) -> bool {
        self.bound.contains_key(identity)
    }

    /// Iterate over `(identity, handle)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, ConnectionHandle)> {
        self.bound.iter().map(|(id, handle)| (id, *handle))
    }

    /// Number of bound sessions.
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}
