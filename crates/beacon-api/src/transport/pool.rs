//! Connection pool: every live WebSocket indexed by handle and identity.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use beacon_core::types::{CloseReason, ConnectionHandle, Identity};
use beacon_realtime::{OutboundMessage, Transport};

use super::connection::Connection;

/// Thread-safe pool of all active WebSocket connections.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    /// Identity → handles (one identity may hold several sockets).
    by_identity: DashMap<Identity, Vec<ConnectionHandle>>,
    /// Handle → connection for direct lookup.
    by_id: DashMap<ConnectionHandle, Arc<Connection>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a connection for `identity` and add it to the pool.
    pub fn register(
        &self,
        identity: Identity,
        buffer: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let conn = Arc::new(Connection::new(identity, tx));
        self.by_id.insert(conn.id, Arc::clone(&conn));
        self.by_identity
            .entry(conn.identity.clone())
            .or_default()
            .push(conn.id);
        (conn, rx)
    }

    /// Removes a connection from the pool.
    pub fn remove(&self, handle: &ConnectionHandle) -> Option<Arc<Connection>> {
        let (_, conn) = self.by_id.remove(handle)?;
        if let Some(mut handles) = self.by_identity.get_mut(&conn.identity) {
            handles.retain(|h| h != handle);
            if handles.is_empty() {
                drop(handles);
                self.by_identity
                    .remove_if(&conn.identity, |_, handles| handles.is_empty());
            }
        }
        Some(conn)
    }

    /// Gets a specific connection by handle.
    pub fn get(&self, handle: &ConnectionHandle) -> Option<Arc<Connection>> {
        self.by_id.get(handle).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns total number of active connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Returns number of distinct connected identities.
    pub fn identity_count(&self) -> usize {
        self.by_identity.len()
    }

    /// Close every connection (server shutdown).
    pub fn close_all(&self) {
        for entry in self.by_id.iter() {
            entry.value().close(CloseReason::Intentional);
        }
    }

    fn live(&self) -> Vec<Arc<Connection>> {
        self.by_id
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[async_trait]
impl Transport for ConnectionPool {
    async fn live_connections(&self) -> Vec<(Identity, ConnectionHandle)> {
        self.live()
            .into_iter()
            .map(|conn| (conn.identity.clone(), conn.id))
            .collect()
    }

    async fn send(&self, handle: ConnectionHandle, msg: OutboundMessage) -> bool {
        match self.get(&handle) {
            Some(conn) => conn.send(msg),
            None => false,
        }
    }

    async fn broadcast(&self, msg: OutboundMessage) -> usize {
        self.live()
            .into_iter()
            .filter(|conn| conn.send(msg.clone()))
            .count()
    }

    async fn disconnect(&self, handle: ConnectionHandle) -> bool {
        match self.get(&handle) {
            Some(conn) => {
                conn.close(CloseReason::Intentional);
                true
            }
            None => false,
        }
    }
}
