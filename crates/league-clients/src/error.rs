use league_core::LeagueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure, timeout, or a non-success status.
    #[error("Standings source unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something we cannot interpret.
    #[error("Standings source contract violated: {0}")]
    Contract(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Email transport error: {0}")]
    Transport(String),

    #[error("Email rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<SourceError> for LeagueError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Unavailable(m) => LeagueError::SourceUnavailable(m),
            SourceError::Contract(m) => LeagueError::SourceContract(m),
        }
    }
}

impl From<SinkError> for LeagueError {
    fn from(e: SinkError) -> Self {
        LeagueError::Internal(e.to_string())
    }
}
