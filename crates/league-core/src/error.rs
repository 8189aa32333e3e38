use thiserror::Error;

/// Service-wide error taxonomy. Every crate-local error narrows into one of
/// these so jobs can log a stable code regardless of where a failure started.
#[derive(Debug, Error)]
pub enum LeagueError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    #[error("Standings source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Standings source contract violated: {0}")]
    SourceContract(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LeagueError {
    /// Short, stable code used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            LeagueError::NotFound(_) => "NOT_FOUND",
            LeagueError::DuplicateRecord(_) => "DUPLICATE_RECORD",
            LeagueError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            LeagueError::SourceContract(_) => "SOURCE_CONTRACT",
            LeagueError::ValidationFailed(_) => "VALIDATION_FAILED",
            // config faults only surface at startup; they never reach a job
            LeagueError::Config(_) | LeagueError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<serde_json::Error> for LeagueError {
    fn from(e: serde_json::Error) -> Self {
        LeagueError::Internal(format!("serialization: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, LeagueError>;
