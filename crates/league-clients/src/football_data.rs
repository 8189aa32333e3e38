use async_trait::async_trait;
use chrono::Datelike;
use league_core::config::FootballDataConfig;
use league_core::Season;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::standings::{ProviderRow, ProviderStandings, StandingsSource};

/// football-data.org v4 client.
pub struct FootballDataClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl FootballDataClient {
    pub fn new(config: &FootballDataConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        }
    }

    fn standings_url(&self, competition: &str, year: i32) -> String {
        format!(
            "{}/v4/competitions/{}/standings?season={}",
            self.base_url, competition, year
        )
    }
}

#[async_trait]
impl StandingsSource for FootballDataClient {
    fn name(&self) -> &str {
        "football-data.org"
    }

    async fn latest_standings(&self, season: &Season) -> Result<ProviderStandings, SourceError> {
        let competition = season.provider_id.as_deref().ok_or_else(|| {
            SourceError::Contract(format!("season {} has no provider id", season.id))
        })?;
        let url = self.standings_url(competition, season.active.from.year());

        debug!(season_id = %season.id, %url, "requesting standings");

        let resp = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.api_token)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "football-data.org API error");
            return Err(SourceError::Unavailable(format!("status {status}: {text}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        parse_standings(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    season: ApiSeason,
    #[serde(default)]
    standings: Vec<ApiTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSeason {
    current_matchday: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiTable {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    table: Vec<ApiRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRow {
    position: u16,
    team: ApiTeam,
    played_games: u32,
    goals_for: u32,
    goals_against: u32,
    goal_difference: i32,
    points: i32,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    id: serde_json::Value,
}

/// Decode a standings response body. Exactly one `TOTAL` table must be
/// present; home/away splits are ignored.
pub fn parse_standings(body: &str) -> Result<ProviderStandings, SourceError> {
    let resp: ApiResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Contract(format!("cannot decode standings: {e}")))?;

    let current_matchday = resp
        .season
        .current_matchday
        .ok_or_else(|| SourceError::Contract("response has no current matchday".into()))?;

    let mut totals = resp.standings.into_iter().filter(|t| t.kind == "TOTAL");
    let table = match (totals.next(), totals.next()) {
        (Some(t), None) => t,
        (None, _) => return Err(SourceError::Contract("no TOTAL standings table".into())),
        (Some(_), Some(_)) => {
            return Err(SourceError::Contract("more than one TOTAL standings table".into()))
        }
    };

    let rows = table
        .table
        .into_iter()
        .map(|row| {
            let team_provider_id = match &row.team.id {
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::String(s) => s.clone(),
                other => {
                    return Err(SourceError::Contract(format!("unexpected team id {other}")))
                }
            };
            Ok(ProviderRow {
                position: row.position,
                team_provider_id,
                played_games: row.played_games,
                goals_for: row.goals_for,
                goals_against: row.goals_against,
                goal_difference: row.goal_difference,
                points: row.points,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProviderStandings {
        current_matchday,
        rows,
    })
}
