use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::Row;
use thiserror::Error;

use peerbook_core::errors::PersistenceError;

pub mod booking;
pub mod conversation;
pub mod interaction;
pub mod memory;
pub mod service;

pub use booking::SqlBookingStore;
pub use conversation::SqlConversationStore;
pub use interaction::SqlInteractionLog;
pub use memory::{
    InMemoryBookingStore, InMemoryConversationStore, InMemoryInteractionLog,
    InMemoryServiceCatalog,
};
pub use service::SqlServiceCatalog;

/// SQLite result code for a locked or busy database.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<RepositoryError> for PersistenceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => classify(error),
            RepositoryError::Decode(message) => Self::Decode(message),
            RepositoryError::NotFound(message) => Self::NotFound(message),
            RepositoryError::Rejected(message) => Self::Conflict(message),
        }
    }
}

fn classify(error: sqlx::Error) -> PersistenceError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PersistenceError::Conflict(db.message().to_owned())
        }
        sqlx::Error::Database(db)
            if db.is_foreign_key_violation() || db.is_check_violation() =>
        {
            PersistenceError::Conflict(db.message().to_owned())
        }
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) =>
        {
            PersistenceError::Unavailable(db.message().to_owned())
        }
        sqlx::Error::RowNotFound => PersistenceError::NotFound(error.to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => PersistenceError::Decode(error.to_string()),
        _ => PersistenceError::Unavailable(error.to_string()),
    }
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

pub(crate) fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{name}: `{value}` is not RFC 3339: {e}")))
}

pub(crate) fn parse_optional_timestamp(
    name: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.as_deref().map(|value| parse_timestamp(name, value)).transpose()
}

pub(crate) fn parse_decimal(name: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|e| RepositoryError::Decode(format!("{name}: `{value}` is not a decimal: {e}")))
}

pub(crate) fn to_u32(name: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{name}: {value} is out of range")))
}

pub(crate) fn to_optional_u32(
    name: &str,
    value: Option<i64>,
) -> Result<Option<u32>, RepositoryError> {
    value.map(|value| to_u32(name, value)).transpose()
}
