use league_core::LeagueError;
use rusqlite::ffi;
use thiserror::Error;

/// Persistence errors, already narrowed from whatever SQLite reported.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("no matching row".into()),
            rusqlite::Error::SqliteFailure(err, msg)
                if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StoreError::DuplicateRecord(msg.unwrap_or_else(|| err.to_string()))
            }
            other => StoreError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Internal(format!("rankings serialization: {e}"))
    }
}

impl From<StoreError> for LeagueError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => LeagueError::NotFound(m),
            StoreError::DuplicateRecord(m) => LeagueError::DuplicateRecord(m),
            StoreError::Validation(m) => LeagueError::ValidationFailed(m),
            StoreError::Internal(m) => LeagueError::Internal(m),
        }
    }
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
