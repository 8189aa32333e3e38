use league_core::LeagueError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("Invalid schedule '{spec}': {reason}")]
    InvalidSchedule { spec: String, reason: String },

    /// A job with this name is already registered.
    #[error("Duplicate job: {0}")]
    DuplicateJob(String),

    #[error("Job not found: {name}")]
    JobNotFound { name: String },
}

impl From<SchedulerError> for LeagueError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::InvalidSchedule { .. } => LeagueError::Config(e.to_string()),
            SchedulerError::DuplicateJob(name) => LeagueError::DuplicateRecord(format!("job {name}")),
            SchedulerError::JobNotFound { name } => LeagueError::NotFound(format!("job {name}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
