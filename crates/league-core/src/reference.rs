use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::London;
use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::error::{LeagueError, Result};
use crate::season::Season;
use crate::timeframe::TimeFrame;
use crate::types::{Team, TeamId};

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Immutable teams and seasons, shared read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    teams: HashMap<TeamId, Team>,
    by_provider: HashMap<String, TeamId>,
    seasons: BTreeMap<String, Season>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    #[serde(default)]
    teams: Vec<Team>,
    #[serde(default)]
    seasons: Vec<RawSeason>,
}

#[derive(Debug, Deserialize)]
struct RawSeason {
    id: String,
    name: String,
    provider_id: Option<String>,
    max_rounds: u32,
    teams: Vec<TeamId>,
    active: RawFrame,
    entries_accepted: RawFrame,
    #[serde(default)]
    selections_accepted: Vec<RawFrame>,
}

/// Endpoints are naive wall-clock times in Europe/London.
#[derive(Debug, Deserialize)]
struct RawFrame {
    from: Option<String>,
    until: Option<String>,
}

impl Registry {
    /// Load and validate a reference TOML file.
    pub fn load(path: &str) -> Result<Self> {
        if !std::path::Path::new(path).is_file() {
            return Err(LeagueError::Config(format!("reference file {path} not found")));
        }
        Self::from_figment(Figment::new().merge(Toml::file(path)))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let raw: RawReference = figment
            .extract()
            .map_err(|e| LeagueError::Config(format!("reference data: {e}")))?;

        let seasons = raw
            .seasons
            .into_iter()
            .map(RawSeason::into_season)
            .collect::<Result<Vec<_>>>()?;

        Self::from_parts(raw.teams, seasons)
    }

    /// Build a registry from already-typed records, enforcing the
    /// cross-record invariants.
    pub fn from_parts(teams: Vec<Team>, seasons: Vec<Season>) -> Result<Self> {
        let mut registry = Registry::default();

        for team in teams {
            if registry.by_provider.contains_key(&team.provider_id) {
                return Err(LeagueError::Config(format!(
                    "provider id {} is used by more than one team",
                    team.provider_id
                )));
            }
            registry
                .by_provider
                .insert(team.provider_id.clone(), team.id.clone());
            if registry.teams.insert(team.id.clone(), team).is_some() {
                return Err(LeagueError::Config("duplicate team id".into()));
            }
        }

        for season in seasons {
            registry.check_season(&season)?;
            if registry.seasons.contains_key(&season.id) {
                return Err(LeagueError::Config(format!(
                    "season {} is defined more than once",
                    season.id
                )));
            }
            registry.seasons.insert(season.id.clone(), season);
        }

        Ok(registry)
    }

    fn check_season(&self, season: &Season) -> Result<()> {
        let fail = |msg: String| LeagueError::Config(format!("season {}: {msg}", season.id));

        if season.max_rounds == 0 {
            return Err(fail("max_rounds must be positive".into()));
        }
        if !season.active.is_valid() || !season.entries_accepted.is_valid() {
            return Err(fail("active and entries_accepted must be valid timeframes".into()));
        }
        for (i, window) in season.selections_accepted.iter().enumerate() {
            if !window.is_valid() {
                return Err(fail(format!("prediction window {} is invalid", i + 1)));
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &season.selections_accepted[p]) {
                if prev.until > window.from {
                    return Err(fail(format!(
                        "prediction window {} overlaps or precedes window {}",
                        i + 1,
                        i
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for id in &season.teams {
            if !self.teams.contains_key(id) {
                return Err(fail(format!("unknown team {id}")));
            }
            if !seen.insert(id) {
                return Err(fail(format!("team {id} listed twice")));
            }
        }
        Ok(())
    }

    pub fn team_by_id(&self, id: &TeamId) -> Option<&Team> {
        self.teams.get(id)
    }

    pub fn team_by_provider_id(&self, provider_id: &str) -> Option<&Team> {
        self.by_provider
            .get(provider_id)
            .and_then(|id| self.teams.get(id))
    }

    pub fn season_by_id(&self, id: &str) -> Option<&Season> {
        self.seasons.get(id)
    }

    /// Seasons ordered by id.
    pub fn seasons(&self) -> impl Iterator<Item = &Season> {
        self.seasons.values()
    }
}

impl RawSeason {
    fn into_season(self) -> Result<Season> {
        let id = self.id;
        let frame = |raw: RawFrame, what: &str| {
            raw.into_frame()
                .map_err(|e| LeagueError::Config(format!("season {id}: {what}: {e}")))
        };

        let active = frame(self.active, "active")?;
        let entries_accepted = frame(self.entries_accepted, "entries_accepted")?;
        let selections_accepted = self
            .selections_accepted
            .into_iter()
            .enumerate()
            .map(|(i, w)| frame(w, &format!("prediction window {}", i + 1)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Season {
            id: id.clone(),
            name: self.name,
            provider_id: self.provider_id.filter(|p| !p.is_empty()),
            active,
            entries_accepted,
            selections_accepted,
            teams: self.teams,
            max_rounds: self.max_rounds,
        })
    }
}

impl RawFrame {
    fn into_frame(self) -> std::result::Result<TimeFrame, String> {
        let from = self.from.ok_or("missing 'from'")?;
        let until = self.until.ok_or("missing 'until'")?;
        TimeFrame::new(parse_london(&from)?, parse_london(&until)?).map_err(|e| e.to_string())
    }
}

/// Interpret a naive `YYYY-MM-DDTHH:MM:SS` as Europe/London wall-clock time.
/// Ambiguous times (autumn clock change) resolve to the earlier instant.
pub fn parse_london(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(value, LOCAL_FORMAT)
        .map_err(|e| format!("'{value}': {e}"))?;
    London
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("'{value}' does not exist in Europe/London"))
}
