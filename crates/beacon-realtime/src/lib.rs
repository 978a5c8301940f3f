//! # beacon-realtime
//!
//! Presence reconciliation engine for Beacon. Provides:
//!
//! - Session registry (identity → live connection handle)
//! - Grace-period disconnect handling with generation-checked timers
//! - Active verification against the transport's live connections
//! - Periodic backstop sweeps for stale online records and idle sessions
//! - Coalesced roster broadcasts
//! - Per-identity sliding-window rate limiting
//!
//! All mutable state is owned by a single actor task; callers talk to it
//! through the cloneable [`PresenceEngine`] handle.

pub mod activity;
pub mod broadcast;
pub mod engine;
pub mod grace;
pub mod message;
pub mod metrics;
pub mod rate_limit;
pub mod registry;
pub mod transport;
pub mod verification;

pub use engine::{EngineSnapshot, PresenceEngine};
pub use message::{InboundMessage, OutboundMessage};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use transport::Transport;
pub use verification::VerifyOutcome;
