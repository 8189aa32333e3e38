use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal team identifier (short code, e.g. `"AFC"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl TeamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TeamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A club that can appear in a season. Loaded once from reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub short_name: String,
    /// Identifier used by the external standings provider.
    pub provider_id: String,
}

/// Per-team counters reported alongside a standings position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingMeta {
    pub played_games: u32,
    pub points: i32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i32,
}

/// One row of an observed league table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingWithMeta {
    pub id: TeamId,
    pub position: u16,
    pub metadata: RankingMeta,
}

/// Sort rankings by ascending position, breaking ties on team id so the
/// order is deterministic even for malformed provider data.
pub fn sort_rankings(rankings: &mut [RankingWithMeta]) {
    rankings.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
}

/// Team ids in table order.
pub fn team_ids(rankings: &[RankingWithMeta]) -> Vec<TeamId> {
    rankings.iter().map(|r| r.id.clone()).collect()
}
