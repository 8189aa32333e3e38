pub mod clock;
pub mod config;
pub mod error;
pub mod reference;
pub mod scoring;
pub mod season;
pub mod timeframe;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{LeagueError, Result};
pub use reference::Registry;
pub use season::Season;
pub use timeframe::{SequencedTimeFrame, TimeFrame};
pub use types::{RankingMeta, RankingWithMeta, Team, TeamId};
