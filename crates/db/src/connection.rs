use std::str::FromStr;
use std::time::Duration;

use peerbook_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a pool with foreign keys on, WAL journaling and a busy timeout. File databases are
/// created on first use. An in-memory database lives inside a single connection, so its pool is
/// capped at one.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let in_memory = is_in_memory(database_url);
    let mut options = SqliteConnectOptions::from_str(database_url)?
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    if !in_memory {
        options = options.create_if_missing(true).journal_mode(SqliteJournalMode::Wal);
    }

    let max_connections = if in_memory { 1 } else { max_connections.max(1) };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await?;

    tracing::debug!(
        event_name = "db.pool_opened",
        max_connections,
        in_memory,
        timeout_secs,
        "sqlite pool ready"
    );
    Ok(pool)
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
