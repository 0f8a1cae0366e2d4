//! SQLite pool construction and schema bootstrap.
//!
//! The schema lives in `migrations/` and is applied idempotently on every
//! open. Reads and writes go directly through the pool; per-key atomicity is
//! achieved with single-statement conditional updates (see the kernel
//! modules) rather than a writer actor.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::CoreError;

/// Schema applied at startup.
const SCHEMA: &str = include_str!("../migrations/001_schema.sql");

/// Connections kept by a file-backed pool.
const FILE_POOL_CONNECTIONS: u32 = 8;

/// Open (creating if missing) a file-backed database and apply the schema.
///
/// # Errors
///
/// Returns [`CoreError::PersistenceFailure`] if the file cannot be opened or
/// the schema fails to apply.
pub async fn open(path: &Path) -> Result<SqlitePool, CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::PersistenceFailure(format!(
                    "failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(FILE_POOL_CONNECTIONS)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    info!(path = %path.display(), "database opened");
    Ok(pool)
}

/// Open a private in-memory database with the schema applied.
///
/// Uses a single connection that never expires, since every SQLite
/// `:memory:` connection is its own database.
///
/// # Errors
///
/// Returns [`CoreError::PersistenceFailure`] if the schema fails to apply.
pub async fn open_in_memory() -> Result<SqlitePool, CoreError> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Apply the schema. Safe to run repeatedly.
///
/// # Errors
///
/// Returns [`CoreError::PersistenceFailure`] on SQL failure.
pub async fn migrate(pool: &SqlitePool) -> Result<(), CoreError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Encode a timestamp the way every table stores it (RFC 3339, UTC, micros).
pub fn encode_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp.
///
/// # Errors
///
/// Returns [`CoreError::PersistenceFailure`] if the column is not RFC 3339.
pub fn decode_time(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::PersistenceFailure(format!("bad stored timestamp {raw:?}: {e}")))
}
