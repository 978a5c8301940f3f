//! Shared domain types: identities, connection handles, presence records.

pub mod id;
pub mod identity;
pub mod presence;

pub use id::ConnectionHandle;
pub use identity::Identity;
pub use presence::{CloseReason, LocationHint, PresenceRecord, PresenceStatus};
