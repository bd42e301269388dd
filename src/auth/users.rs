//! Principal storage consumed by the auth core.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgArguments, PgRow},
    query::Query,
    Connection, PgPool, Postgres, Row,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::Instrument;

use super::Clock;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user not found")]
    NotFound,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user directory error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            Self::DuplicateEmail
        } else {
            Self::Backend(err.into())
        }
    }
}

/// Stored principal. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: u64,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string, empty for federated-only accounts.
    pub password_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fails with `DuplicateEmail` if the email is taken.
    async fn create(&self, principal: NewPrincipal) -> Result<Principal, DirectoryError>;

    async fn get_by_id(&self, id: u64) -> Result<Principal, DirectoryError>;

    async fn get_by_email(&self, email: &str) -> Result<Principal, DirectoryError>;

    async fn ping(&self) -> Result<(), DirectoryError>;
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

const SELECT_COLUMNS: &str = "id, name, email, password_hash, \
     EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at, \
     EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at";

fn principal_from_row(row: &PgRow) -> Result<Principal, DirectoryError> {
    let id: i64 = row.try_get("id")?;
    Ok(Principal {
        id: u64::try_from(id).map_err(|_| DirectoryError::Backend(anyhow!("negative user id {id}")))?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// `users` table in PostgreSQL, see `sql/schema.sql`.
#[derive(Clone, Debug)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_principal(
        &self,
        statement: &str,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<Principal, DirectoryError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = statement
        );
        let row = query.fetch_optional(&self.pool).instrument(span).await?;

        match row {
            Some(row) => principal_from_row(&row),
            None => Err(DirectoryError::NotFound),
        }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn create(&self, principal: NewPrincipal) -> Result<Principal, DirectoryError> {
        let query = format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING {SELECT_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(&principal.name)
            .bind(&principal.email)
            .bind(&principal.password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        principal_from_row(&row)
    }

    async fn get_by_id(&self, id: u64) -> Result<Principal, DirectoryError> {
        let Ok(id) = i64::try_from(id) else {
            return Err(DirectoryError::NotFound);
        };
        let query = format!("SELECT {SELECT_COLUMNS} FROM users WHERE id = $1");
        self.fetch_principal(&query, sqlx::query(&query).bind(id))
            .await
    }

    async fn get_by_email(&self, email: &str) -> Result<Principal, DirectoryError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM users WHERE email = $1");
        self.fetch_principal(&query, sqlx::query(&query).bind(email))
            .await
    }

    async fn ping(&self) -> Result<(), DirectoryError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}

/// In-process directory with sequential ids.
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<u64, Principal>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn create(&self, principal: NewPrincipal) -> Result<Principal, DirectoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == principal.email) {
            return Err(DirectoryError::DuplicateEmail);
        }
        let now = self.clock.now();
        let created = Principal {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: principal.name,
            email: principal.email,
            password_hash: principal.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: u64) -> Result<Principal, DirectoryError> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Principal, DirectoryError> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }

    async fn ping(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}
