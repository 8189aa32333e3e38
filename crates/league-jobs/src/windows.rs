use std::sync::Arc;

use async_trait::async_trait;
use league_core::season::{window_closing_query, window_open_query};
use league_core::{LeagueError, Season, SequencedTimeFrame};
use league_scheduler::Task;
use league_store::Entry;
use tracing::{debug, error, info, warn};

use crate::error::{JobError, Result};
use crate::notify::fan_out;
use crate::{within_deadline, JobContext};

/// Which edge of a prediction window a job announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEdge {
    Opening,
    Closing,
}

impl WindowEdge {
    fn job_prefix(self) -> &'static str {
        match self {
            WindowEdge::Opening => "prediction-window-open",
            WindowEdge::Closing => "prediction-window-closing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOutcome {
    /// No window edge fell inside the query timeframe.
    NoWindow,
    Notified {
        window: usize,
        of: usize,
        sent: usize,
        failed: usize,
    },
}

/// Emails every approved entrant when one of the season's prediction
/// windows has just opened or is about to close.
pub struct PredictionWindowJob {
    name: String,
    edge: WindowEdge,
    season: Arc<Season>,
    ctx: JobContext,
}

impl PredictionWindowJob {
    pub fn new(edge: WindowEdge, season: Arc<Season>, ctx: JobContext) -> Self {
        Self {
            name: format!("{}-{}", edge.job_prefix(), season.id).to_lowercase(),
            edge,
            season,
            ctx,
        }
    }

    pub fn opening(season: Arc<Season>, ctx: JobContext) -> Self {
        Self::new(WindowEdge::Opening, season, ctx)
    }

    pub fn closing(season: Arc<Season>, ctx: JobContext) -> Self {
        Self::new(WindowEdge::Closing, season, ctx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn matching_window(&self) -> Option<SequencedTimeFrame> {
        let now = self.ctx.clock.now();
        match self.edge {
            WindowEdge::Opening => self.season.window_begins_within(&window_open_query(now)),
            WindowEdge::Closing => self.season.window_ends_within(&window_closing_query(now)),
        }
    }

    pub async fn execute(&self) -> Result<WindowOutcome> {
        let Some(window) = self.matching_window() else {
            debug!(job = %self.name, "no prediction window in range");
            return Ok(WindowOutcome::NoWindow);
        };

        let entries = self
            .ctx
            .store
            .entries
            .select_by_season_id(&self.season.id, true)
            .map_err(|e| JobError::new(&self.name, "load entries", e))?;
        let total = entries.len();

        let ctx = self.ctx.clone();
        let season = self.season.clone();
        let edge = self.edge;
        let failures = fan_out(entries, self.ctx.settings.concurrency, move |entry: Entry| {
            let ctx = ctx.clone();
            let season = season.clone();
            async move {
                let email = match edge {
                    WindowEdge::Opening => ctx.composer.window_open(&entry, &season, &window)?,
                    WindowEdge::Closing => ctx.composer.window_closing(&entry, &season, &window)?,
                };
                ctx.sink.send(&email).await?;
                Ok::<(), LeagueError>(())
            }
        })
        .await;

        for e in &failures {
            warn!(job = %self.name, code = e.code(), error = %e, "window email failed");
        }
        info!(
            job = %self.name,
            window = window.index,
            of = window.total,
            recipients = total,
            failed = failures.len(),
            "window notifications issued"
        );

        Ok(WindowOutcome::Notified {
            window: window.index,
            of: window.total,
            sent: total - failures.len(),
            failed: failures.len(),
        })
    }
}

#[async_trait]
impl Task for PredictionWindowJob {
    async fn run(&self) {
        let deadline = self.ctx.settings.deadline;
        match within_deadline(&self.name, deadline, self.execute()).await {
            Ok(outcome) => debug!(job = %self.name, ?outcome, "job finished"),
            Err(e) => error!(job = %e.job, code = e.code(), error = %e, "job failed"),
        }
    }
}
