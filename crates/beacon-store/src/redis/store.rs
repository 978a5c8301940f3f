//! Redis presence store.
//!
//! Each record is a JSON string at `{prefix}presence:{identity}`; the set
//! `{prefix}presence:online` indexes identities currently flagged online so
//! the sweep does not scan the keyspace.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use beacon_core::error::{AppError, ErrorKind};
use beacon_core::result::AppResult;
use beacon_core::traits::PresenceStore;
use beacon_core::types::{Identity, PresenceRecord};

use super::client::RedisClient;

/// Redis-backed presence store.
#[derive(Debug, Clone)]
pub struct RedisPresenceStore {
    /// Redis client.
    client: RedisClient,
}

impl RedisPresenceStore {
    /// Create a new Redis presence store.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Store, format!("Redis error: {e}"), e)
    }

    fn record_key(&self, identity: &str) -> String {
        self.client.prefixed_key(&format!("presence:{identity}"))
    }

    fn online_set_key(&self) -> String {
        self.client.prefixed_key("presence:online")
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn get(&self, identity: &Identity) -> AppResult<Option<PresenceRecord>> {
        let mut conn = self.client.conn_mut();
        let raw: Option<String> = conn
            .get(self.record_key(identity.as_str()))
            .await
            .map_err(Self::map_err)?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: &PresenceRecord) -> AppResult<()> {
        let json = serde_json::to_string(record)?;
        let key = self.record_key(record.identity.as_str());
        let online_set = self.online_set_key();
        let member = record.identity.as_str();

        let mut pipe = redis::pipe();
        pipe.atomic().set(&key, json).ignore();
        if record.online {
            pipe.sadd(&online_set, member).ignore();
        } else {
            pipe.srem(&online_set, member).ignore();
        }

        let mut conn = self.client.conn_mut();
        let _: () = pipe.query_async(&mut conn).await.map_err(Self::map_err)?;

        debug!(identity = %record.identity, online = record.online, "Presence record written");
        Ok(())
    }

    async fn list_online(&self) -> AppResult<Vec<PresenceRecord>> {
        let mut conn = self.client.conn_mut();
        let members: Vec<String> = conn
            .smembers(self.online_set_key())
            .await
            .map_err(Self::map_err)?;

        let mut records = Vec::with_capacity(members.len());
        for member in members {
            let raw: Option<String> = conn
                .get(self.record_key(&member))
                .await
                .map_err(Self::map_err)?;

            match raw.map(|json| serde_json::from_str::<PresenceRecord>(&json)) {
                Some(Ok(record)) if record.online => records.push(record),
                Some(Ok(_)) | None => {
                    let _: () = conn
                        .srem(self.online_set_key(), &member)
                        .await
                        .map_err(Self::map_err)?;
                }
                Some(Err(e)) => {
                    warn!(identity = %member, error = %e, "Skipping undecodable presence record");
                }
            }
        }

        Ok(records)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}
