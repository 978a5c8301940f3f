//! The presence engine: a cloneable handle in front of a single actor task.
//!
//! Every mutation of sessions, pending disconnects, rate windows and the
//! roster queue happens inside the actor, in command arrival order.

mod actor;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use beacon_core::config::{PresenceConfig, RateLimitConfig};
use beacon_core::error::AppError;
use beacon_core::result::AppResult;
use beacon_core::traits::{Clock, PresenceStore};
use beacon_core::types::{
    CloseReason, ConnectionHandle, Identity, LocationHint, PresenceRecord, PresenceStatus,
};

use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::transport::Transport;
use crate::verification::VerifyOutcome;

use self::actor::EngineActor;

/// Point-in-time view of the actor's in-memory state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Identities with a bound connection.
    pub bound_sessions: usize,
    /// Transient closes waiting out their grace window.
    pub pending_disconnects: usize,
    /// Live rate-limit windows.
    pub rate_windows: usize,
    /// Identities with recorded activity.
    pub tracked_activity: usize,
    /// Identities queued for the next roster broadcast.
    pub roster_pending: usize,
}

/// Commands processed by the actor.
pub(crate) enum Command {
    Register {
        identity: Identity,
        location: Option<LocationHint>,
        reply: oneshot::Sender<AppResult<PresenceStatus>>,
    },
    ConnectionOpened {
        identity: Identity,
        handle: ConnectionHandle,
    },
    ConnectionClosed {
        identity: Identity,
        handle: ConnectionHandle,
        reason: CloseReason,
    },
    Liveness {
        identity: Identity,
        handle: Option<ConnectionHandle>,
    },
    Verify {
        identity: Identity,
        reply: oneshot::Sender<AppResult<VerifyOutcome>>,
    },
    VerifyMany {
        identities: Vec<Identity>,
        requester: Option<Identity>,
        reply: oneshot::Sender<AppResult<Vec<PresenceStatus>>>,
    },
    MarkOffline {
        identity: Identity,
        reply: oneshot::Sender<AppResult<PresenceStatus>>,
    },
    OutboundEvent {
        identity: Identity,
        handle: ConnectionHandle,
        event_type: String,
        to: Option<Identity>,
        payload: serde_json::Value,
    },
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    /// Posted by a probe worker once the transport has been enumerated.
    ProbeCompleted {
        identity: Identity,
        /// Registry epoch of the identity when the probe started.
        epoch: u64,
        live: Vec<(Identity, ConnectionHandle)>,
        reply: oneshot::Sender<AppResult<VerifyOutcome>>,
    },
    /// Posted by the sweep worker with the records flagged online.
    SweepLoaded {
        records: AppResult<Vec<PresenceRecord>>,
    },
}

/// Cloneable handle to the presence engine.
#[derive(Debug, Clone)]
pub struct PresenceEngine {
    tx: mpsc::Sender<Command>,
    metrics: Arc<EngineMetrics>,
}

impl PresenceEngine {
    /// Start the actor on the current runtime.
    pub fn spawn(
        presence: PresenceConfig,
        rate_limit: RateLimitConfig,
        store: Arc<dyn PresenceStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(presence.command_buffer_size.max(1));
        let metrics = Arc::new(EngineMetrics::new());

        let actor = EngineActor::new(
            presence,
            rate_limit,
            store,
            transport,
            clock,
            Arc::clone(&metrics),
            rx,
            tx.downgrade(),
        );
        let task = tokio::spawn(actor.run());

        info!("Presence engine started");
        (Self { tx, metrics }, task)
    }

    /// Create the record for `identity` if absent; update its location hint
    /// when one is supplied.
    pub async fn register(
        &self,
        identity: Identity,
        location: Option<LocationHint>,
    ) -> AppResult<PresenceStatus> {
        self.request(|reply| Command::Register {
            identity,
            location,
            reply,
        })
        .await?
    }

    /// A connection declaring `identity` was established.
    pub async fn connection_opened(
        &self,
        identity: Identity,
        handle: ConnectionHandle,
    ) -> AppResult<()> {
        self.send(Command::ConnectionOpened { identity, handle }).await
    }

    /// A connection closed.
    pub async fn connection_closed(
        &self,
        identity: Identity,
        handle: ConnectionHandle,
        reason: CloseReason,
    ) -> AppResult<()> {
        self.send(Command::ConnectionClosed {
            identity,
            handle,
            reason,
        })
        .await
    }

    /// A liveness signal, optionally arriving on a specific connection.
    pub async fn liveness(
        &self,
        identity: Identity,
        handle: Option<ConnectionHandle>,
    ) -> AppResult<()> {
        self.send(Command::Liveness { identity, handle }).await
    }

    /// Actively verify whether `identity` is online.
    pub async fn verify_one(&self, identity: Identity) -> AppResult<VerifyOutcome> {
        self.request(|reply| Command::Verify { identity, reply })
            .await?
    }

    /// Correct stale online claims among `identities`.
    ///
    /// Corrections are broadcast and, when `requester` has a bound session,
    /// also sent to it directly. Returns the corrected statuses.
    pub async fn verify_many(
        &self,
        identities: Vec<Identity>,
        requester: Option<Identity>,
    ) -> AppResult<Vec<PresenceStatus>> {
        self.request(|reply| Command::VerifyMany {
            identities,
            requester,
            reply,
        })
        .await?
    }

    /// Force `identity` offline regardless of which connection is bound.
    pub async fn mark_offline(&self, identity: Identity) -> AppResult<PresenceStatus> {
        self.request(|reply| Command::MarkOffline { identity, reply })
            .await?
    }

    /// Submit a rate-limited application event.
    pub async fn outbound_event(
        &self,
        identity: Identity,
        handle: ConnectionHandle,
        event_type: String,
        to: Option<Identity>,
        payload: serde_json::Value,
    ) -> AppResult<()> {
        self.send(Command::OutboundEvent {
            identity,
            handle,
            event_type,
            to,
            payload,
        })
        .await
    }

    /// Snapshot of the actor's in-memory state.
    pub async fn snapshot(&self) -> AppResult<EngineSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Count a frame rejected at the boundary.
    pub fn record_rejected(&self) {
        EngineMetrics::inc(&self.metrics.events_rejected);
    }

    /// Stop the actor after the commands queued before this one.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn send(&self, cmd: Command) -> AppResult<()> {
        self.tx.send(cmd).await.map_err(|_| stopped())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> AppResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| stopped())
    }
}

fn stopped() -> AppError {
    AppError::service_unavailable("Presence engine is not running")
}
