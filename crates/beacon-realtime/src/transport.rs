//! The transport collaborator: live connections and message delivery.

use async_trait::async_trait;

use beacon_core::types::{ConnectionHandle, Identity};

use crate::message::OutboundMessage;

/// Bidirectional connection layer the engine sits on.
///
/// Implementations must not block: `send` and `broadcast` enqueue and return.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug + 'static {
    /// Enumerate live connections with the identity each declared.
    async fn live_connections(&self) -> Vec<(Identity, ConnectionHandle)>;

    /// Send a message to one connection. Returns `false` if it is gone.
    async fn send(&self, handle: ConnectionHandle, msg: OutboundMessage) -> bool;

    /// Send a message to every live connection. Returns the delivery count.
    async fn broadcast(&self, msg: OutboundMessage) -> usize;

    /// Close a connection from the server side.
    async fn disconnect(&self, handle: ConnectionHandle) -> bool;
}
