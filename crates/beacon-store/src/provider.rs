//! Store manager that dispatches to the configured provider.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use beacon_core::config::StoreConfig;
use beacon_core::error::AppError;
use beacon_core::result::AppResult;
use beacon_core::traits::PresenceStore;
use beacon_core::types::{Identity, PresenceRecord};

/// Store manager that wraps the configured presence store provider.
///
/// The provider is selected at construction time based on configuration.
#[derive(Debug, Clone)]
pub struct StoreManager {
    /// The inner store provider.
    inner: Arc<dyn PresenceStore>,
}

impl StoreManager {
    /// Create a new store manager from configuration.
    pub async fn new(config: &StoreConfig) -> AppResult<Self> {
        let inner: Arc<dyn PresenceStore> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis presence store");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Arc::new(crate::redis::RedisPresenceStore::new(client))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory presence store");
                Arc::new(crate::memory::MemoryPresenceStore::new())
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown store provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a store manager from an existing provider (for testing).
    pub fn from_provider(provider: Arc<dyn PresenceStore>) -> Self {
        Self { inner: provider }
    }
}

#[async_trait]
impl PresenceStore for StoreManager {
    async fn get(&self, identity: &Identity) -> AppResult<Option<PresenceRecord>> {
        self.inner.get(identity).await
    }

    async fn upsert(&self, record: &PresenceRecord) -> AppResult<()> {
        self.inner.upsert(record).await
    }

    async fn list_online(&self) -> AppResult<Vec<PresenceRecord>> {
        self.inner.list_online().await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}
