//! Individual WebSocket connection handle.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use beacon_core::types::{CloseReason, ConnectionHandle, Identity};
use beacon_realtime::OutboundMessage;

/// A handle to a single WebSocket connection.
///
/// Holds the sender channel for pushing messages to the client plus the
/// identity the client declared at upgrade time.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection handle
    pub id: ConnectionHandle,
    /// Identity declared by the client
    pub identity: Identity,
    /// Sender for outbound messages
    pub sender: mpsc::Sender<OutboundMessage>,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    /// Last inbound frame of any kind
    last_inbound: RwLock<Instant>,
    alive: AtomicBool,
    close_reason: OnceLock<CloseReason>,
    closed: CancellationToken,
}

impl Connection {
    /// Create a new connection handle
    pub fn new(identity: Identity, sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: ConnectionHandle::new(),
            identity,
            sender,
            connected_at: Utc::now(),
            last_inbound: RwLock::new(Instant::now()),
            alive: AtomicBool::new(true),
            close_reason: OnceLock::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Queue an outbound message. Never waits on a slow client.
    pub fn send(&self, msg: OutboundMessage) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    kind = msg.kind(),
                    "Connection send buffer full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close(CloseReason::Transient);
                false
            }
        }
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Close from the server side. The first reason recorded wins.
    pub fn close(&self, reason: CloseReason) {
        let _ = self.close_reason.set(reason);
        self.alive.store(false, Ordering::SeqCst);
        self.closed.cancel();
    }

    /// Why the connection was closed by the server, if it was.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Resolves once the server closes the connection.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Record an inbound frame
    pub async fn touch(&self) {
        *self.last_inbound.write().await = Instant::now();
    }

    /// Time since the last inbound frame
    pub async fn idle_for(&self) -> std::time::Duration {
        self.last_inbound.read().await.elapsed()
    }
}
