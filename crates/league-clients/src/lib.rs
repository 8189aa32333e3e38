pub mod email;
pub mod error;
pub mod football_data;
pub mod mailgun;
pub mod standings;

pub use email::{Email, EmailSink, Identity, LogSink};
pub use error::{SinkError, SourceError};
pub use football_data::FootballDataClient;
pub use mailgun::MailgunClient;
pub use standings::{ProviderRow, ProviderStandings, StandingsSource};
