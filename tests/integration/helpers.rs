//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use beacon_api::{AppState, ConnectionPool, build_router};
use beacon_core::config::{AppConfig, PresenceConfig, RateLimitConfig};
use beacon_core::error::AppError;
use beacon_core::result::AppResult;
use beacon_core::traits::{Clock, MonotonicClock, PresenceStore};
use beacon_core::types::{ConnectionHandle, Identity, PresenceRecord};
use beacon_realtime::{OutboundMessage, PresenceEngine, Transport};
use beacon_store::{MemoryPresenceStore, StoreManager};

/// Parse a test identity.
pub fn id(name: &str) -> Identity {
    Identity::parse(name).expect("valid identity")
}

/// One delivery recorded by [`RecordingTransport`].
#[derive(Debug, Clone)]
pub enum Delivery {
    Broadcast(OutboundMessage),
    Targeted(ConnectionHandle, OutboundMessage),
}

/// Transport double that records every delivery and reports a settable
/// list of live connections.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    live: Mutex<Vec<(Identity, ConnectionHandle)>>,
    deliveries: Mutex<Vec<Delivery>>,
    disconnected: Mutex<Vec<ConnectionHandle>>,
    gate: Mutex<Option<Arc<LiveGate>>>,
}

/// Holds the next `live_connections` call after it has copied the list.
#[derive(Debug, Default)]
pub struct LiveGate {
    /// Signalled once the list has been copied.
    pub reached: Notify,
    /// Lets the held call return.
    pub release: Notify,
}

impl RecordingTransport {
    pub fn add_live(&self, identity: &Identity, handle: ConnectionHandle) {
        self.live.lock().unwrap().push((identity.clone(), handle));
    }

    pub fn drop_live(&self, handle: ConnectionHandle) {
        self.live.lock().unwrap().retain(|(_, h)| *h != handle);
    }

    pub fn broadcasts(&self) -> Vec<OutboundMessage> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|d| match d {
                Delivery::Broadcast(msg) => Some(msg.clone()),
                Delivery::Targeted(..) => None,
            })
            .collect()
    }

    /// Broadcasts of one wire kind, e.g. `"presence_offline"`.
    pub fn broadcasts_of(&self, kind: &str) -> Vec<OutboundMessage> {
        self.broadcasts()
            .into_iter()
            .filter(|m| m.kind() == kind)
            .collect()
    }

    pub fn sent_to(&self, handle: ConnectionHandle) -> Vec<OutboundMessage> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|d| match d {
                Delivery::Targeted(h, msg) if *h == handle => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn sent_to_of(&self, handle: ConnectionHandle, kind: &str) -> Vec<OutboundMessage> {
        self.sent_to(handle)
            .into_iter()
            .filter(|m| m.kind() == kind)
            .collect()
    }

    pub fn disconnected(&self) -> Vec<ConnectionHandle> {
        self.disconnected.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.deliveries.lock().unwrap().clear();
    }

    /// Hold the next `live_connections` call until the gate is released.
    pub fn hold_next_listing(&self) -> Arc<LiveGate> {
        let gate = Arc::new(LiveGate::default());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn live_connections(&self) -> Vec<(Identity, ConnectionHandle)> {
        let live = self.live.lock().unwrap().clone();
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        live
    }

    async fn send(&self, handle: ConnectionHandle, msg: OutboundMessage) -> bool {
        self.deliveries
            .lock()
            .unwrap()
            .push(Delivery::Targeted(handle, msg));
        true
    }

    async fn broadcast(&self, msg: OutboundMessage) -> usize {
        let mut deliveries = self.deliveries.lock().unwrap();
        deliveries.push(Delivery::Broadcast(msg));
        1
    }

    async fn disconnect(&self, handle: ConnectionHandle) -> bool {
        self.drop_live(handle);
        self.disconnected.lock().unwrap().push(handle);
        true
    }
}

/// In-memory store whose next writes fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryPresenceStore,
    failing_upserts: AtomicUsize,
}

impl FlakyStore {
    pub fn fail_next_upserts(&self, count: usize) {
        self.failing_upserts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl PresenceStore for FlakyStore {
    async fn get(&self, identity: &Identity) -> AppResult<Option<PresenceRecord>> {
        self.inner.get(identity).await
    }

    async fn upsert(&self, record: &PresenceRecord) -> AppResult<()> {
        let failed = self
            .failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AppError::store("write refused"));
        }
        self.inner.upsert(record).await
    }

    async fn list_online(&self) -> AppResult<Vec<PresenceRecord>> {
        self.inner.list_online().await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}

/// An engine wired to an in-memory store and a recording transport.
pub struct TestEngine {
    pub engine: PresenceEngine,
    pub transport: Arc<RecordingTransport>,
    pub store: MemoryPresenceStore,
    pub clock: Arc<MonotonicClock>,
}

impl TestEngine {
    /// Engine with default timings.
    pub fn start() -> Self {
        Self::with_config(PresenceConfig::default(), RateLimitConfig::default())
    }

    pub fn with_config(presence: PresenceConfig, rate_limit: RateLimitConfig) -> Self {
        let store = MemoryPresenceStore::new();
        Self::over(Arc::new(store.clone()), store, presence, rate_limit)
    }

    /// Engine with default timings whose writes can be made to fail.
    pub fn flaky() -> (Self, Arc<FlakyStore>) {
        let flaky = Arc::new(FlakyStore::default());
        let t = Self::over(
            Arc::clone(&flaky) as Arc<dyn PresenceStore>,
            flaky.inner.clone(),
            PresenceConfig::default(),
            RateLimitConfig::default(),
        );
        (t, flaky)
    }

    fn over(
        backend: Arc<dyn PresenceStore>,
        store: MemoryPresenceStore,
        presence: PresenceConfig,
        rate_limit: RateLimitConfig,
    ) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let clock = Arc::new(MonotonicClock::new());

        let (engine, _task) = PresenceEngine::spawn(
            presence,
            rate_limit,
            backend,
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        Self {
            engine,
            transport,
            store,
            clock,
        }
    }

    /// Register `name` and return its identity.
    pub async fn registered(&self, name: &str) -> Identity {
        let identity = id(name);
        self.engine
            .register(identity.clone(), None)
            .await
            .expect("register");
        identity
    }

    /// Register `name`, open a live connection for it and wait until the
    /// engine has processed it.
    pub async fn connected(&self, name: &str) -> (Identity, ConnectionHandle) {
        let identity = self.registered(name).await;
        let handle = ConnectionHandle::new();
        self.transport.add_live(&identity, handle);
        self.engine
            .connection_opened(identity.clone(), handle)
            .await
            .expect("open");
        self.settle().await;
        (identity, handle)
    }

    /// Wait until every command sent so far has been processed.
    pub async fn settle(&self) {
        self.engine.snapshot().await.expect("engine running");
    }

    pub async fn record(&self, identity: &Identity) -> PresenceRecord {
        self.store
            .get(identity)
            .await
            .expect("store")
            .expect("record exists")
    }
}

/// Response captured from the router.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// HTTP application over an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let config = AppConfig::default();
        let memory = MemoryPresenceStore::new();
        let store = StoreManager::from_provider(Arc::new(memory));
        let connections = Arc::new(ConnectionPool::new());

        let (engine, _task) = PresenceEngine::spawn(
            config.presence.clone(),
            config.rate_limit.clone(),
            Arc::new(store.clone()),
            Arc::clone(&connections) as Arc<dyn Transport>,
            Arc::new(MonotonicClock::new()),
        );

        let state = AppState::new(Arc::new(config), store, engine, connections);
        let router = build_router(state.clone());
        Self { router, state }
    }

    /// Send a request through the router.
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
