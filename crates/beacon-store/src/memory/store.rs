//! In-memory presence store backed by `dashmap`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use beacon_core::result::AppResult;
use beacon_core::traits::PresenceStore;
use beacon_core::types::{Identity, PresenceRecord};

/// In-memory presence store.
///
/// Durable only for the life of the process; suitable for single-node
/// deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryPresenceStore {
    /// Identity → record.
    records: Arc<DashMap<Identity, PresenceRecord>>,
}

impl MemoryPresenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered identities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no identity has been registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn get(&self, identity: &Identity) -> AppResult<Option<PresenceRecord>> {
        Ok(self.records.get(identity).map(|r| r.value().clone()))
    }

    async fn upsert(&self, record: &PresenceRecord) -> AppResult<()> {
        trace!(identity = %record.identity, online = record.online, "Upserting presence record");
        self.records.insert(record.identity.clone(), record.clone());
        Ok(())
    }

    async fn list_online(&self) -> AppResult<Vec<PresenceRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.value().online)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
