//! Session records: principal id to the single live token identity.
//!
//! Two stores run side by side, one per token kind, each with its own TTL and
//! logical database so eviction of one never touches the other.

use anyhow::Context;
use async_trait::async_trait;
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client, ConnectionInfo, IntoConnectionInfo,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::Instrument;

use super::Clock;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session store error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.into())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record `token_id` for `principal` with the store TTL, replacing any prior identity.
    async fn set(&self, principal: &str, token_id: &str) -> Result<(), SessionError>;

    async fn get(&self, principal: &str) -> Result<String, SessionError>;

    /// Returns `NotFound` when nothing was recorded.
    async fn delete(&self, principal: &str) -> Result<(), SessionError>;

    async fn ping(&self) -> Result<(), SessionError>;

    fn ttl_seconds(&self) -> i64;
}

/// Build connection info for `url` with the logical database forced to `db`.
///
/// # Errors
/// Returns an error if the url is not a valid redis url.
pub fn connection_info(url: &str, db: i64) -> anyhow::Result<ConnectionInfo> {
    let mut info = url
        .into_connection_info()
        .with_context(|| format!("invalid redis url: {url}"))?;
    info.redis.db = db;
    Ok(info)
}

#[derive(Clone)]
pub struct RedisSessionStore {
    manager: ConnectionManager,
    db: i64,
    ttl_seconds: i64,
}

impl RedisSessionStore {
    /// Commands and reconnect attempts give up after `timeout`.
    ///
    /// # Errors
    /// Returns an error if the url is invalid or the first connection fails.
    pub async fn connect(
        url: &str,
        db: i64,
        ttl_seconds: i64,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::open(connection_info(url, db)?)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(timeout)
            .set_response_timeout(timeout);
        let manager = ConnectionManager::new_with_config(client, config)
            .await
            .with_context(|| format!("failed to connect to redis db {db}"))?;
        Ok(Self {
            manager,
            db,
            ttl_seconds,
        })
    }

    fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "session.command",
            db.system = "redis",
            db.redis.database_index = self.db,
            db.operation = operation
        )
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn set(&self, principal: &str, token_id: &str) -> Result<(), SessionError> {
        let mut conn = self.manager.clone();
        let ttl = u64::try_from(self.ttl_seconds).unwrap_or(1);
        conn.set_ex::<_, _, ()>(principal, token_id, ttl)
            .instrument(self.span("SET"))
            .await?;
        Ok(())
    }

    async fn get(&self, principal: &str) -> Result<String, SessionError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(principal).instrument(self.span("GET")).await?;
        value.ok_or(SessionError::NotFound)
    }

    async fn delete(&self, principal: &str) -> Result<(), SessionError> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.del(principal).instrument(self.span("DEL")).await?;
        if removed == 0 {
            return Err(SessionError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), SessionError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .instrument(self.span("PING"))
            .await?;
        Ok(())
    }

    fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("db", &self.db)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

/// In-process store with clock-driven expiry. Expired entries are pruned on
/// every write.
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, (String, i64)>>,
    ttl_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(ttl_seconds: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_seconds,
            clock,
        }
    }

    /// Number of entries held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(&self, principal: &str, token_id: &str) -> Result<(), SessionError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        entries.insert(
            principal.to_string(),
            (token_id.to_string(), now + self.ttl_seconds),
        );
        Ok(())
    }

    async fn get(&self, principal: &str) -> Result<String, SessionError> {
        let now = self.clock.now();
        match self.entries.read().await.get(principal) {
            Some((token_id, expires_at)) if now < *expires_at => Ok(token_id.clone()),
            _ => Err(SessionError::NotFound),
        }
    }

    async fn delete(&self, principal: &str) -> Result<(), SessionError> {
        let now = self.clock.now();
        match self.entries.write().await.remove(principal) {
            Some((_, expires_at)) if now < expires_at => Ok(()),
            _ => Err(SessionError::NotFound),
        }
    }

    async fn ping(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}
