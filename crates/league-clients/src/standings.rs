use async_trait::async_trait;
use league_core::Season;

use crate::error::SourceError;

/// One table row as the provider reports it, before team ids are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRow {
    pub position: u16,
    pub team_provider_id: String,
    pub played_games: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i32,
    pub points: i32,
}

/// The provider's current table for a competition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStandings {
    pub current_matchday: u32,
    pub rows: Vec<ProviderRow>,
}

/// External source of live league tables.
///
/// Callers bound each call with their own deadline; dropping the future
/// cancels the request.
#[async_trait]
pub trait StandingsSource: Send + Sync {
    fn name(&self) -> &str;

    async fn latest_standings(&self, season: &Season) -> Result<ProviderStandings, SourceError>;
}
