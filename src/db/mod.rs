/// Database layer
///
/// Manages the SQLite connection pool, embedded migrations and the
/// account store.

pub mod account;
pub mod store;

pub use account::{Account, Gender};
pub use store::{AccountStore, SqliteAccountStore};

use crate::{
    config::DatabaseLocation,
    error::{ApiError, ApiResult},
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::{path::Path, str::FromStr, time::Duration};

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a connection pool for the configured location
pub async fn create_pool(
    location: &DatabaseLocation,
    options: DatabaseOptions,
) -> ApiResult<SqlitePool> {
    match location {
        DatabaseLocation::File { path } => create_file_pool(path, options).await,
        DatabaseLocation::Memory => create_memory_pool().await,
    }
}

async fn create_file_pool(path: &Path, options: DatabaseOptions) -> ApiResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let connect = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(if options.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        })
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect)
        .await?;

    tracing::info!(path = %path.display(), "opened account database");
    Ok(pool)
}

/// In-memory database: every connection would get its own database, so the
/// pool is pinned to one connection that is never recycled.
pub async fn create_memory_pool() -> ApiResult<SqlitePool> {
    let connect = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect)
        .await?;

    tracing::debug!("opened in-memory account database");
    Ok(pool)
}

/// Run migrations embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> ApiResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(ApiError::Store)?;

    Ok(())
}
