use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LeagueError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "league.toml";
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_NOTIFICATION_CONCURRENCY: usize = 10;
pub const FOOTBALL_DATA_TOKEN_ENV: &str = "FOOTBALL_DATA_API_TOKEN";

/// Top-level config (league.toml + LEAGUE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeagueConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub football_data: FootballDataConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub realms: Vec<RealmConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Location of the static teams/seasons file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_reference_path")]
    pub path: String,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            path: default_reference_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootballDataConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_football_data_base_url")]
    pub base_url: String,
}

impl Default for FootballDataConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: default_football_data_base_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailConfig {
    /// When absent, outgoing mail is written to the log instead.
    pub mailgun: Option<MailgunConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
    #[serde(default = "default_mailgun_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Deadline covering one whole task invocation.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Upper bound on concurrent email sends per fan-out.
    #[serde(default = "default_notification_concurrency")]
    pub notification_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            notification_concurrency: DEFAULT_NOTIFICATION_CONCURRENCY,
        }
    }
}

/// A tenant. Entries carry the realm name; notifications are sent with the
/// realm's sender identity and link back to its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmConfig {
    pub name: String,
    pub season_id: String,
    pub origin: String,
    pub sender_name: String,
    pub sender_address: String,
    pub reply_to_address: String,
}

fn default_db_path() -> String {
    "league.db".to_string()
}
fn default_reference_path() -> String {
    "config/reference.toml".to_string()
}
fn default_football_data_base_url() -> String {
    "https://api.football-data.org".to_string()
}
fn default_mailgun_base_url() -> String {
    "https://api.eu.mailgun.net".to_string()
}
fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}
fn default_notification_concurrency() -> usize {
    DEFAULT_NOTIFICATION_CONCURRENCY
}

impl LeagueConfig {
    /// Load config from a TOML file with LEAGUE_* env var overrides.
    ///
    /// Path resolution: explicit argument, then `LEAGUE_CONFIG`, then
    /// `./league.toml`. A missing file is not an error; defaults apply.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("LEAGUE_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        debug!(path = %path, "loading config");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("LEAGUE_").ignore(&["CONFIG"]).split("__")),
        )
    }

    /// Extract from a prepared figment and apply the bare token fallback.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: LeagueConfig = figment
            .extract()
            .map_err(|e| LeagueError::Config(e.to_string()))?;

        if config.football_data.api_token.trim().is_empty() {
            if let Ok(token) = std::env::var(FOOTBALL_DATA_TOKEN_ENV) {
                debug!("football-data token taken from {FOOTBALL_DATA_TOKEN_ENV}");
                config.football_data.api_token = token;
            }
        }
        Ok(config)
    }

    pub fn realm(&self, name: &str) -> Option<&RealmConfig> {
        self.realms.iter().find(|r| r.name == name)
    }

    /// Fail unless everything the pipeline cannot run without is present.
    pub fn validate(&self) -> Result<()> {
        if self.football_data.api_token.trim().is_empty() {
            return Err(LeagueError::Config(format!(
                "football_data.api_token is empty (set it in the config file or via {FOOTBALL_DATA_TOKEN_ENV})"
            )));
        }
        if self.scheduler.task_timeout_secs == 0 {
            return Err(LeagueError::Config(
                "scheduler.task_timeout_secs must be positive".into(),
            ));
        }
        if self.scheduler.notification_concurrency == 0 {
            return Err(LeagueError::Config(
                "scheduler.notification_concurrency must be positive".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for realm in &self.realms {
            if !seen.insert(realm.name.as_str()) {
                return Err(LeagueError::Config(format!(
                    "realm '{}' is configured more than once",
                    realm.name
                )));
            }
        }
        Ok(())
    }
}
