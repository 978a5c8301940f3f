//! Collaborator traits implemented outside this crate.

pub mod clock;
pub mod store;

pub use clock::{Clock, MonotonicClock};
pub use store::PresenceStore;
