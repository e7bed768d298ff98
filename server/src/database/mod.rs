pub mod create;
pub mod movies;
pub mod permissions;
pub mod tokens;
pub mod users;
pub mod utils;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

use shared::types::server_config::DatabaseConfig;

/// How long startup waits for the first round-trip before giving up.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DataError {
    #[error("record not found")]
    RecordNotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("storage operation exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("unsafe sort parameter: {0}")]
    UnsafeSort(String),

    #[error("entropy source failed: {0}")]
    Entropy(#[from] rand::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DataError {
    /// Maps a UNIQUE constraint violation to `DuplicateEmail`, leaving every
    /// other error untouched. `users.email` is the only unique column that
    /// client input can collide on.
    fn unique_as_duplicate_email(self) -> Self {
        match self {
            DataError::Database(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                DataError::DuplicateEmail
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

/// Connection pool plus the per-operation deadline every model function runs
/// under.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl Database {
    /// Open the pool, verify it answers within five seconds and bring the
    /// schema up to date.
    pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&cfg.dsn)
            .with_context(|| format!("invalid database DSN {:?}", cfg.dsn))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` gets its own private database, so an
        // in-memory pool is pinned to one connection that is never recycled.
        let in_memory = cfg.dsn.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options
                .max_connections(cfg.max_open_conns)
                .idle_timeout(Some(cfg.max_idle_time()))
        };

        let pool = pool_options
            .acquire_timeout(PING_TIMEOUT)
            .connect_with(options)
            .await
            .context("failed to open database pool")?;

        tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(&pool))
            .await
            .context("database did not answer within 5s")?
            .context("database ping failed")?;

        let db = Self {
            pool,
            query_timeout: cfg.query_timeout(),
        };
        create::create_tables(&db).await?;

        info!(
            "Database ready ({}, query timeout {:?})",
            if in_memory { "in-memory" } else { cfg.dsn.as_str() },
            db.query_timeout
        );
        Ok(db)
    }

    /// A private in-memory database with the default deadline.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::connect(&DatabaseConfig {
            dsn: "sqlite::memory:".to_string(),
            max_open_conns: 1,
            ..DatabaseConfig::default()
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Run one storage operation under the configured deadline. Expiry drops
    /// the query future, which abandons the statement.
    pub async fn timed<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, operation).await {
            Ok(result) => result.map_err(DataError::from),
            Err(_) => Err(DataError::Timeout(self.query_timeout)),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
