use std::time::Duration;

use league_core::LeagueError;
use thiserror::Error;

/// A failed job invocation: which job, which step, and the underlying
/// taxonomy error.
#[derive(Debug, Error)]
#[error("{job}: {step}: {source}")]
pub struct JobError {
    pub job: String,
    pub step: &'static str,
    #[source]
    pub source: LeagueError,
}

impl JobError {
    pub fn new(job: impl Into<String>, step: &'static str, source: impl Into<LeagueError>) -> Self {
        Self {
            job: job.into(),
            step,
            source: source.into(),
        }
    }

    pub fn deadline(job: impl Into<String>, limit: Duration) -> Self {
        Self::new(
            job,
            "deadline",
            LeagueError::Internal(format!("exceeded {limit:?} deadline")),
        )
    }

    pub fn code(&self) -> &'static str {
        self.source.code()
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
