//! The actor task that owns all presence state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::time::DelayQueue;
use tracing::{debug, info, warn};

use beacon_core::config::{PresenceConfig, RateLimitConfig};
use beacon_core::error::AppError;
use beacon_core::result::AppResult;
use beacon_core::traits::{Clock, PresenceStore};
use beacon_core::types::{
    CloseReason, ConnectionHandle, Identity, LocationHint, PresenceRecord, PresenceStatus,
};

use super::{Command, EngineSnapshot};
use crate::activity::ActivityTracker;
use crate::broadcast::ThrottledBroadcast;
use crate::grace::GraceManager;
use crate::message::OutboundMessage;
use crate::metrics::EngineMetrics;
use crate::rate_limit::{Admission, RateLimiter};
use crate::registry::SessionRegistry;
use crate::transport::Transport;
use crate::verification::{
    ProbeResolution, VerifyOutcome, needs_correction, offline_last_seen, resolve_probe,
};

/// Scheduled wake-ups.
#[derive(Debug)]
enum Timer {
    GraceExpiry { identity: Identity, generation: u64 },
    RosterFlush,
}

pub(super) struct EngineActor {
    presence: PresenceConfig,
    rate_limit: RateLimitConfig,
    store: Arc<dyn PresenceStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,

    registry: SessionRegistry,
    grace: GraceManager,
    activity: ActivityTracker,
    roster: ThrottledBroadcast,
    limiter: RateLimiter,
    /// Last heartbeat-driven store write per identity.
    liveness_writes: HashMap<Identity, Instant>,
    timers: DelayQueue<Timer>,
    sweep_in_flight: bool,

    commands: mpsc::Receiver<Command>,
    /// Lets worker tasks post results without keeping the actor alive.
    loopback: mpsc::WeakSender<Command>,
}

impl EngineActor {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        presence: PresenceConfig,
        rate_limit: RateLimitConfig,
        store: Arc<dyn PresenceStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
        commands: mpsc::Receiver<Command>,
        loopback: mpsc::WeakSender<Command>,
    ) -> Self {
        let limiter = RateLimiter::from_config(&rate_limit);
        Self {
            presence,
            rate_limit,
            store,
            transport,
            clock,
            metrics,
            registry: SessionRegistry::new(),
            grace: GraceManager::new(),
            activity: ActivityTracker::new(),
            roster: ThrottledBroadcast::new(),
            limiter,
            liveness_writes: HashMap::new(),
            timers: DelayQueue::new(),
            sweep_in_flight: false,
            commands,
            loopback,
        }
    }

    pub(super) async fn run(mut self) {
        let start = Instant::now();
        let mut presence_sweep = interval_at(
            start + self.presence.sweep_interval(),
            self.presence.sweep_interval(),
        );
        let mut idle_sweep = interval_at(
            start + self.presence.idle_sweep_interval(),
            self.presence.idle_sweep_interval(),
        );
        let mut rate_sweep = interval_at(
            start + self.rate_limit.sweep_interval(),
            self.rate_limit.sweep_interval(),
        );
        for ticker in [&mut presence_sweep, &mut idle_sweep, &mut rate_sweep] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                Some(expired) = self.timers.next() => {
                    self.on_timer(expired.into_inner()).await;
                }
                _ = presence_sweep.tick() => self.start_presence_sweep(),
                _ = idle_sweep.tick() => self.expire_idle_sessions().await,
                _ = rate_sweep.tick() => {
                    let removed = self.limiter.sweep(Instant::now());
                    debug!(removed, remaining = self.limiter.len(), "Rate windows swept");
                }
            }
        }

        info!(
            bound_sessions = self.registry.len(),
            pending_disconnects = self.grace.len(),
            "Presence engine stopped"
        );
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Register {
                identity,
                location,
                reply,
            } => {
                let result = self.register(identity, location).await;
                let _ = reply.send(result);
            }
            Command::ConnectionOpened { identity, handle } => {
                EngineMetrics::inc(&self.metrics.events_received);
                self.connection_opened(identity, handle).await;
            }
            Command::ConnectionClosed {
                identity,
                handle,
                reason,
            } => {
                EngineMetrics::inc(&self.metrics.events_received);
                self.connection_closed(identity, handle, reason).await;
            }
            Command::Liveness { identity, handle } => {
                EngineMetrics::inc(&self.metrics.events_received);
                let _ = self.liveness(identity, handle).await;
            }
            Command::Verify { identity, reply } => {
                EngineMetrics::inc(&self.metrics.verifications);
                self.verify(identity, reply).await;
            }
            Command::ProbeCompleted {
                identity,
                epoch,
                live,
                reply,
            } => {
                let result = self.apply_probe(identity, epoch, &live).await;
                let _ = reply.send(result);
            }
            Command::VerifyMany {
                identities,
                requester,
                reply,
            } => {
                let corrected = self.verify_many(identities, requester).await;
                let _ = reply.send(Ok(corrected));
            }
            Command::MarkOffline { identity, reply } => {
                EngineMetrics::inc(&self.metrics.events_received);
                let result = self.mark_offline(identity).await;
                let _ = reply.send(result);
            }
            Command::OutboundEvent {
                identity,
                handle,
                event_type,
                to,
                payload,
            } => {
                EngineMetrics::inc(&self.metrics.events_received);
                self.outbound_event(identity, handle, event_type, to, payload)
                    .await;
            }
            Command::SweepLoaded { records } => {
                self.sweep_in_flight = false;
                self.finish_presence_sweep(records).await;
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(EngineSnapshot {
                    bound_sessions: self.registry.len(),
                    pending_disconnects: self.grace.len(),
                    rate_windows: self.limiter.len(),
                    tracked_activity: self.activity.len(),
                    roster_pending: self.roster.pending_len(),
                });
            }
            // Handled by the run loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::GraceExpiry {
                identity,
                generation,
            } => self.resolve_grace(identity, generation).await,
            Timer::RosterFlush => {
                if let Some(changed) = self.roster.flush() {
                    EngineMetrics::inc(&self.metrics.roster_broadcasts);
                    debug!(changed, "Broadcasting roster change");
                    self.transport
                        .broadcast(OutboundMessage::RosterChanged { changed })
                        .await;
                }
            }
        }
    }

    // -- lifecycle -----------------------------------------------------------

    async fn register(
        &mut self,
        identity: Identity,
        location: Option<LocationHint>,
    ) -> AppResult<PresenceStatus> {
        match self.load(&identity).await? {
            Some(mut record) => {
                if location.is_some() && record.location != location {
                    record.location = location;
                    self.save(&record).await?;
                }
                Ok(record.status())
            }
            None => {
                let record = PresenceRecord::registered(identity, self.clock.now(), location);
                self.save(&record).await?;
                info!(identity = %record.identity, "Presence record created");
                Ok(record.status())
            }
        }
    }

    async fn connection_opened(&mut self, identity: Identity, handle: ConnectionHandle) {
        let Some(record) = self.load_known(&identity, Some(handle)).await else {
            return;
        };

        self.bind_session(&identity, handle);
        self.activity.record(&identity, Instant::now());
        debug!(identity = %identity, conn_id = %handle, "Connection opened");

        let _ = self.bring_online(record, Some(handle), false).await;
    }

    /// Returns `false` if no record could be loaded for the identity.
    async fn liveness(&mut self, identity: Identity, handle: Option<ConnectionHandle>) -> bool {
        let Some(record) = self.load_known(&identity, handle).await else {
            return false;
        };

        if let Some(handle) = handle {
            self.bind_session(&identity, handle);
        }
        let now = Instant::now();
        self.activity.record(&identity, now);

        let refresh_due = self.liveness_writes.get(&identity).is_none_or(|at| {
            now.saturating_duration_since(*at) >= self.presence.liveness_write_interval()
        });
        let _ = self.bring_online(record, handle, refresh_due).await;
        true
    }

    async fn connection_closed(
        &mut self,
        identity: Identity,
        handle: ConnectionHandle,
        reason: CloseReason,
    ) {
        match self.registry.lookup(&identity) {
            Some(bound) if bound != handle => {
                debug!(
                    identity = %identity,
                    conn_id = %handle,
                    reason = reason.as_str(),
                    "Ignoring close of superseded connection"
                );
                return;
            }
            None if reason == CloseReason::Transient => {
                debug!(identity = %identity, conn_id = %handle, "Ignoring transient close of unbound connection");
                return;
            }
            _ => {}
        }

        match reason {
            CloseReason::Transient => {
                let grace = self.presence.grace_period();
                let pending =
                    self.grace
                        .schedule(&identity, handle, self.clock.now(), Instant::now(), grace);
                self.timers.insert(
                    Timer::GraceExpiry {
                        identity: identity.clone(),
                        generation: pending.generation,
                    },
                    grace,
                );
                EngineMetrics::inc(&self.metrics.grace_scheduled);
                debug!(
                    identity = %identity,
                    conn_id = %handle,
                    generation = pending.generation,
                    "Transient close, grace period started"
                );
            }
            CloseReason::Intentional => {
                self.grace.cancel(&identity);
                self.release_session(&identity);
                let now = self.clock.now();
                if let Ok(Some(record)) = self.load(&identity).await {
                    let _ = self.take_offline(record, now).await;
                }
            }
        }
    }

    async fn mark_offline(&mut self, identity: Identity) -> AppResult<PresenceStatus> {
        let record = self
            .load(&identity)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Identity '{identity}' not found")))?;

        if self.grace.cancel(&identity).is_some() {
            EngineMetrics::inc(&self.metrics.grace_cancelled);
        }
        self.release_session(&identity);
        let now = self.clock.now();
        let record = self.take_offline(record, now).await?;
        Ok(record.status())
    }

    async fn resolve_grace(&mut self, identity: Identity, generation: u64) {
        let Some(pending) = self.grace.take_if_current(&identity, generation) else {
            return;
        };

        if self
            .registry
            .lookup(&identity)
            .is_some_and(|bound| bound != pending.handle)
        {
            return;
        }
        self.registry.unbind(&identity, pending.handle);

        let now = Instant::now();
        if self.activity.active_after(
            &identity,
            pending.disconnected_instant,
            now,
            self.presence.recency_threshold(),
        ) {
            EngineMetrics::inc(&self.metrics.grace_cancelled);
            debug!(identity = %identity, "Recent activity after disconnect, staying online");
            if let Ok(Some(mut record)) = self.load(&identity).await {
                if record.connection == Some(pending.handle) {
                    record.connection = None;
                    let _ = self.save(&record).await;
                }
            }
            return;
        }

        EngineMetrics::inc(&self.metrics.grace_expired);
        self.activity.remove(&identity);
        self.liveness_writes.remove(&identity);
        if let Ok(Some(record)) = self.load(&identity).await {
            let _ = self.take_offline(record, pending.disconnected_at).await;
        }
    }

    // -- verification --------------------------------------------------------

    async fn verify(&mut self, identity: Identity, reply: oneshot::Sender<AppResult<VerifyOutcome>>) {
        let record = match self.load(&identity).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let _ = reply.send(Ok(VerifyOutcome::NotFound));
                return;
            }
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        if self.grace.is_within_grace(&identity, Instant::now()) {
            let _ = reply.send(Ok(VerifyOutcome::Found(record.status())));
            return;
        }

        let epoch = self.registry.epoch(&identity);
        let transport = Arc::clone(&self.transport);
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let live = transport.live_connections().await;
            if let Some(tx) = loopback.upgrade() {
                let _ = tx
                    .send(Command::ProbeCompleted {
                        identity,
                        epoch,
                        live,
                        reply,
                    })
                    .await;
            }
        });
    }

    async fn apply_probe(
        &mut self,
        identity: Identity,
        epoch: u64,
        live: &[(Identity, ConnectionHandle)],
    ) -> AppResult<VerifyOutcome> {
        let Some(record) = self.load(&identity).await? else {
            return Ok(VerifyOutcome::NotFound);
        };

        if self.grace.is_within_grace(&identity, Instant::now()) {
            return Ok(VerifyOutcome::Found(record.status()));
        }

        // The live list predates the current binding and cannot judge it.
        if self.registry.epoch(&identity) != epoch {
            debug!(identity = %identity, "Binding changed during verification, keeping it");
            return Ok(VerifyOutcome::Found(record.status()));
        }

        let record = match resolve_probe(&identity, self.registry.lookup(&identity), live) {
            ProbeResolution::Confirmed(handle) => self.bring_online(record, Some(handle), false).await?,
            ProbeResolution::Rebind { handle, stale } => {
                if let Some(stale) = stale {
                    self.registry.unbind(&identity, stale);
                }
                self.bind_session(&identity, handle);
                self.activity.record(&identity, Instant::now());
                debug!(identity = %identity, conn_id = %handle, "Verification rebound live connection");
                self.bring_online(record, Some(handle), false).await?
            }
            ProbeResolution::Gone { stale } => {
                if let Some(stale) = stale {
                    debug!(identity = %identity, conn_id = %stale, "Verification found dead binding");
                }
                let pending = self.grace.cancel(&identity);
                self.release_session(&identity);
                let last_seen = offline_last_seen(&record, pending.as_ref());
                self.take_offline(record, last_seen).await?
            }
        };

        Ok(VerifyOutcome::Found(record.status()))
    }

    async fn verify_many(
        &mut self,
        identities: Vec<Identity>,
        requester: Option<Identity>,
    ) -> Vec<PresenceStatus> {
        let requester_handle = requester.as_ref().and_then(|r| self.registry.lookup(r));
        let now = self.clock.now();
        let mut corrected = Vec::new();

        for identity in identities {
            if self.registry.is_bound(&identity) || self.grace.is_pending(&identity) {
                continue;
            }
            let Ok(Some(record)) = self.load(&identity).await else {
                continue;
            };
            if let Some(status) = self.correct_if_stale(record, now).await {
                if let Some(handle) = requester_handle {
                    self.transport
                        .send(
                            handle,
                            OutboundMessage::PresenceOffline {
                                identity: status.identity.clone(),
                                last_seen: status.last_seen,
                            },
                        )
                        .await;
                }
                corrected.push(status);
            }
        }

        corrected
    }

    fn start_presence_sweep(&mut self) {
        if self.sweep_in_flight {
            debug!("Previous presence sweep still running, skipping");
            return;
        }
        self.sweep_in_flight = true;

        let store = Arc::clone(&self.store);
        let store_timeout = self.presence.store_timeout();
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let records = tokio::time::timeout(store_timeout, store.list_online())
                .await
                .unwrap_or_else(|elapsed| Err(elapsed.into()));
            if let Some(tx) = loopback.upgrade() {
                let _ = tx.send(Command::SweepLoaded { records }).await;
            }
        });
    }

    async fn finish_presence_sweep(&mut self, records: AppResult<Vec<PresenceRecord>>) {
        let records = match records {
            Ok(records) => records,
            Err(e) => {
                self.store_failed("list_online", &e);
                return;
            }
        };

        let now = self.clock.now();
        let staleness = self.presence.staleness_threshold();
        let mut corrected = 0usize;

        for candidate in records {
            let identity = candidate.identity.clone();
            let bound = self.registry.is_bound(&identity);
            let pending = self.grace.is_pending(&identity);
            if !needs_correction(&candidate, bound, pending, now, staleness) {
                continue;
            }
            // The snapshot may predate a fresh liveness write.
            let Ok(Some(record)) = self.load(&identity).await else {
                continue;
            };
            if self.correct_if_stale(record, now).await.is_some() {
                corrected += 1;
            }
        }

        if corrected > 0 {
            info!(corrected, "Presence sweep corrected stale records");
        } else {
            debug!("Presence sweep found nothing stale");
        }
    }

    async fn correct_if_stale(
        &mut self,
        record: PresenceRecord,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<PresenceStatus> {
        let bound = self.registry.is_bound(&record.identity);
        let pending = self.grace.is_pending(&record.identity);
        if !needs_correction(&record, bound, pending, now, self.presence.staleness_threshold()) {
            return None;
        }

        let last_seen = record.last_seen;
        let record = self.take_offline(record, last_seen).await.ok()?;
        EngineMetrics::inc(&self.metrics.sweep_corrections);
        Some(record.status())
    }

    async fn expire_idle_sessions(&mut self) {
        let now = Instant::now();
        let idle = self
            .activity
            .idle_longer_than(now, self.presence.idle_session_timeout());

        for (identity, idle_for) in idle {
            let Some(handle) = self.registry.lookup(&identity) else {
                self.activity.remove(&identity);
                continue;
            };

            info!(
                identity = %identity,
                conn_id = %handle,
                idle_seconds = idle_for.as_secs(),
                "Expiring idle session"
            );
            self.transport
                .send(
                    handle,
                    OutboundMessage::SessionExpired {
                        idle_seconds: idle_for.as_secs(),
                    },
                )
                .await;
            self.transport.disconnect(handle).await;

            self.grace.cancel(&identity);
            self.release_session(&identity);
            let last_seen = self.clock.now();
            if let Ok(Some(record)) = self.load(&identity).await {
                let _ = self.take_offline(record, last_seen).await;
            }
        }
    }

    // -- rate-limited events -------------------------------------------------

    async fn outbound_event(
        &mut self,
        identity: Identity,
        handle: ConnectionHandle,
        event_type: String,
        to: Option<Identity>,
        payload: serde_json::Value,
    ) {
        match self.limiter.admit(&identity, Instant::now()) {
            Admission::Rejected { retry_after, warn } => {
                EngineMetrics::inc(&self.metrics.rate_limited);
                if warn {
                    warn!(identity = %identity, event_type = %event_type, "Rate limit exceeded");
                }
                self.transport
                    .send(
                        handle,
                        OutboundMessage::RateLimited {
                            retry_after_ms: retry_after.as_millis() as u64,
                        },
                    )
                    .await;
            }
            Admission::Admitted => {
                if !self.liveness(identity.clone(), Some(handle)).await {
                    debug!(identity = %identity, event_type = %event_type, "Dropping event from unknown identity");
                    return;
                }

                if let Some(target) = to {
                    match self.registry.lookup(&target) {
                        Some(target_handle) => {
                            self.transport
                                .send(
                                    target_handle,
                                    OutboundMessage::RelayedEvent {
                                        from: identity.clone(),
                                        event_type: event_type.clone(),
                                        payload,
                                    },
                                )
                                .await;
                        }
                        None => {
                            debug!(from = %identity, to = %target, "Event target has no bound session");
                        }
                    }
                }

                self.transport
                    .send(handle, OutboundMessage::EventAccepted { event_type })
                    .await;
            }
        }
    }

    // -- state helpers -------------------------------------------------------

    /// Bind `handle`, cancelling a pending disconnect left by another handle.
    fn bind_session(&mut self, identity: &Identity, handle: ConnectionHandle) {
        if let Some(replaced) = self.registry.bind(identity, handle) {
            if replaced != handle {
                debug!(identity = %identity, old = %replaced, new = %handle, "Session rebound");
            }
        }
        if self
            .grace
            .get(identity)
            .is_some_and(|pending| pending.handle != handle)
        {
            self.grace.cancel(identity);
            EngineMetrics::inc(&self.metrics.grace_cancelled);
            debug!(identity = %identity, conn_id = %handle, "Reconnected within grace period");
        }
    }

    fn release_session(&mut self, identity: &Identity) {
        self.registry.remove(identity);
        self.activity.remove(identity);
        self.liveness_writes.remove(identity);
    }

    /// Mark the record online. Writes only when something visible changes
    /// or `refresh_due` asks for a `last_seen` refresh.
    async fn bring_online(
        &mut self,
        mut record: PresenceRecord,
        handle: Option<ConnectionHandle>,
        refresh_due: bool,
    ) -> AppResult<PresenceRecord> {
        let was_online = record.online;
        let connection_changed = handle.is_some() && record.connection != handle;
        if was_online && !connection_changed && !refresh_due {
            return Ok(record);
        }

        record.online = true;
        record.last_seen = self.clock.now();
        if handle.is_some() {
            record.connection = handle;
        }
        self.save(&record).await?;
        self.liveness_writes
            .insert(record.identity.clone(), Instant::now());

        if !was_online {
            EngineMetrics::inc(&self.metrics.online_transitions);
            info!(identity = %record.identity, "Identity online");
            self.announce(&record).await;
        }
        Ok(record)
    }

    /// Mark the record offline. `last_seen` is only moved on an actual
    /// online → offline transition.
    async fn take_offline(
        &mut self,
        mut record: PresenceRecord,
        last_seen: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<PresenceRecord> {
        let was_online = record.online;
        if !was_online && record.connection.is_none() {
            return Ok(record);
        }

        record.online = false;
        record.connection = None;
        if was_online {
            record.last_seen = last_seen;
        }
        self.save(&record).await?;

        if was_online {
            EngineMetrics::inc(&self.metrics.offline_transitions);
            info!(identity = %record.identity, last_seen = %record.last_seen, "Identity offline");
            self.announce(&record).await;
        }
        Ok(record)
    }

    /// Broadcast a presence change and queue a roster notification.
    async fn announce(&mut self, record: &PresenceRecord) {
        let msg = if record.online {
            OutboundMessage::PresenceOnline {
                identity: record.identity.clone(),
                last_seen: record.last_seen,
            }
        } else {
            OutboundMessage::PresenceOffline {
                identity: record.identity.clone(),
                last_seen: record.last_seen,
            }
        };
        self.transport.broadcast(msg).await;

        if self.roster.schedule(&record.identity) {
            self.timers
                .insert(Timer::RosterFlush, self.presence.coalesce_window());
        }
    }

    /// Load a record, telling `reply_to` when the identity is unknown.
    async fn load_known(
        &self,
        identity: &Identity,
        reply_to: Option<ConnectionHandle>,
    ) -> Option<PresenceRecord> {
        match self.load(identity).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                debug!(identity = %identity, "Event for unknown identity");
                if let Some(handle) = reply_to {
                    self.transport
                        .send(
                            handle,
                            OutboundMessage::IdentityNotFound {
                                identity: identity.to_string(),
                            },
                        )
                        .await;
                }
                None
            }
            Err(_) => None,
        }
    }

    // -- store access --------------------------------------------------------

    async fn load(&self, identity: &Identity) -> AppResult<Option<PresenceRecord>> {
        self.guarded("get", self.store.get(identity)).await
    }

    async fn save(&self, record: &PresenceRecord) -> AppResult<()> {
        self.guarded("upsert", self.store.upsert(record)).await
    }

    async fn guarded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        let result = tokio::time::timeout(self.presence.store_timeout(), call)
            .await
            .unwrap_or_else(|elapsed| Err(elapsed.into()));
        if let Err(e) = &result {
            self.store_failed(op, e);
        }
        result
    }

    fn store_failed(&self, op: &'static str, err: &AppError) {
        EngineMetrics::inc(&self.metrics.store_errors);
        warn!(op, error = %err, "Presence store call failed");
    }
}
