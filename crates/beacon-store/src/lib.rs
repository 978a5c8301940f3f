//! # beacon-store
//!
//! Persisted presence record providers: an in-memory map for single-node
//! deployments and tests, and Redis for a store that survives restarts.
//! [`StoreManager`] selects one from configuration.

#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

#[cfg(feature = "memory")]
pub use memory::MemoryPresenceStore;
pub use provider::StoreManager;
