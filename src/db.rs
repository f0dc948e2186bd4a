//! SQLite pool backing the response cache.
//!
//! Every pooled connection is opened in WAL mode with a busy timeout, so
//! several processes can read and upsert the same cache file. The schema is
//! embedded and migrated on open.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use thiserror::Error;
use tracing::{debug, instrument};

/// SQLite locks the whole file on write, so a handful of readers is plenty.
const MAX_CONNECTIONS: u32 = 5;

/// How long a writer waits on another process's lock before `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures opening the cache database.
#[derive(Error, Debug)]
pub enum DbError {
    /// The file could not be opened or created.
    #[error("cannot open cache database: {0}")]
    Open(#[from] sqlx::Error),

    /// The embedded schema could not be applied.
    #[error("cannot migrate cache schema: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Connection pool for one cache file.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the cache file at `path`, creating it when missing.
    ///
    /// # Errors
    ///
    /// [`DbError::Open`] when the file cannot be opened, [`DbError::Migrate`]
    /// when the schema cannot be applied.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    /// Opens a private in-memory cache.
    ///
    /// The pool holds exactly one connection that is never recycled.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub async fn in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("cache schema ready");
        Ok(Self { pool })
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
