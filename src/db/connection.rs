use std::str::FromStr;
use std::time::Duration;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use super::schema::initialize_schema;
use super::StoreError;

pub type DbPool = SqlitePool;

pub async fn create_db_pool(
    database_path: &str,
    max_connections: u32,
) -> Result<DbPool, StoreError> {
    // Create parent directory if it doesn't exist
    if let Some(parent) = std::path::Path::new(database_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Unavailable(sqlx::Error::Io(e)))?;
    }

    // WAL with a busy timeout so transient locks are waited on instead of failing immediately
    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(StoreError::Unavailable)?;

    initialize_schema(&pool)
        .await
        .map_err(StoreError::Unavailable)?;
    info!("Database ready at {}", database_path);

    Ok(pool)
}

/// A single long-lived connection, since every in-memory connection is its own database.
pub async fn create_in_memory_pool() -> Result<DbPool, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(StoreError::Unavailable)?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(StoreError::Unavailable)?;

    initialize_schema(&pool)
        .await
        .map_err(StoreError::Unavailable)?;

    Ok(pool)
}
