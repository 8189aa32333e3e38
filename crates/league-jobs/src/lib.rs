//! `league-jobs`: the scheduled work of the prediction league.
//!
//! | Job | Schedule (Europe/London) | Does |
//! |-----|--------------------------|------|
//! | `retrieve-latest-standings-{season}` | every 15 minutes | poll table, upsert snapshot, rescore, finalise rounds |
//! | `prediction-window-open-{season}` | 12:34 daily | email entrants when a window opened in the last day |
//! | `prediction-window-closing-{season}` | 16:48 daily | email entrants when a window closes tomorrow |
//! | `purge-expired-tokens` | hourly | delete expired tokens |
//!
//! Every invocation runs under one deadline covering its whole body. Jobs
//! log their own failures; nothing propagates back to the scheduler.

pub mod error;
pub mod messages;
pub mod notify;
pub mod standings;
pub mod tokens;
pub mod windows;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use league_clients::{EmailSink, StandingsSource};
use league_core::config::SchedulerConfig;
use league_core::{Clock, Registry, Season};
use league_scheduler::Job;
use league_store::Store;

pub use error::{JobError, Result};
pub use messages::Composer;
pub use standings::{RetrieveLatestStandingsJob, ScoringRun, StandingsOutcome};
pub use tokens::PurgeExpiredTokensJob;
pub use windows::{PredictionWindowJob, WindowEdge, WindowOutcome};

pub const STANDINGS_SPEC: &str = "*/15 * * * *";
pub const WINDOW_OPEN_SPEC: &str = "34 12 * * *";
pub const WINDOW_CLOSING_SPEC: &str = "48 16 * * *";
pub const PURGE_TOKENS_SPEC: &str = "0 * * * *";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Covers one whole invocation, downstream calls included.
    pub deadline: Duration,
    /// Concurrent email sends per fan-out.
    pub concurrency: usize,
}

impl From<&SchedulerConfig> for JobSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            deadline: Duration::from_secs(config.task_timeout_secs),
            concurrency: config.notification_concurrency,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

/// Everything a job needs, shared by all jobs.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
    pub source: Arc<dyn StandingsSource>,
    pub sink: Arc<dyn EmailSink>,
    pub composer: Arc<Composer>,
    pub clock: Arc<dyn Clock>,
    pub settings: JobSettings,
}

/// Run `body`, failing with an `INTERNAL` job error once `limit` elapses.
/// The body is dropped at the deadline, which cancels whatever it was
/// awaiting.
pub async fn within_deadline<T>(
    job: &str,
    limit: Duration,
    body: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, body).await {
        Ok(result) => result,
        Err(_) => Err(JobError::deadline(job, limit)),
    }
}

/// The per-season jobs. Standings polling is only registered when the
/// season has a provider competition id.
pub fn season_jobs(ctx: &JobContext, season: &Season) -> league_scheduler::Result<Vec<Job>> {
    let season = Arc::new(season.clone());
    let mut jobs = Vec::with_capacity(3);

    if season.provider_id.is_some() {
        let job = RetrieveLatestStandingsJob::new(season.clone(), ctx.clone());
        jobs.push(Job::new(job.name().to_string(), STANDINGS_SPEC, Arc::new(job))?);
    }

    let open = PredictionWindowJob::opening(season.clone(), ctx.clone());
    jobs.push(Job::new(open.name().to_string(), WINDOW_OPEN_SPEC, Arc::new(open))?);

    let closing = PredictionWindowJob::closing(season, ctx.clone());
    jobs.push(Job::new(closing.name().to_string(), WINDOW_CLOSING_SPEC, Arc::new(closing))?);

    Ok(jobs)
}

/// Jobs that are not tied to a season.
pub fn housekeeping_jobs(ctx: &JobContext) -> league_scheduler::Result<Vec<Job>> {
    let purge = PurgeExpiredTokensJob::new(ctx.clone());
    Ok(vec![Job::new(tokens::PURGE_TOKENS_JOB, PURGE_TOKENS_SPEC, Arc::new(purge))?])
}
