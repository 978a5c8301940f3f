//! Persisted presence store trait.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{Identity, PresenceRecord};

/// Key-value store of [`PresenceRecord`]s keyed by identity.
///
/// Writes are single-record and identity-scoped; no cross-identity
/// transactions are needed. Implementations may be slow or fail
/// transiently, callers treat every call as a suspension point.
#[async_trait]
pub trait PresenceStore: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch the record for an identity. `None` if it was never registered.
    async fn get(&self, identity: &Identity) -> AppResult<Option<PresenceRecord>>;

    /// Insert or replace a record.
    async fn upsert(&self, record: &PresenceRecord) -> AppResult<()>;

    /// All records currently flagged online.
    async fn list_online(&self) -> AppResult<Vec<PresenceRecord>>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
