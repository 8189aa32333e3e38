use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use league_clients::ProviderStandings;
use league_core::scoring::score_prediction;
use league_core::types::{sort_rankings, team_ids};
use league_core::{LeagueError, RankingMeta, RankingWithMeta, Season};
use league_scheduler::Task;
use league_store::{Entry, ScoredEntryPrediction, Standings};
use tracing::{debug, error, info, warn};

use crate::error::{JobError, Result};
use crate::notify::fan_out;
use crate::{within_deadline, JobContext};

/// How one standings poll ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandingsOutcome {
    /// The season is not running; nothing was fetched.
    SeasonInactive,
    /// The final round is already finalised; nothing was rescored.
    AlreadyFinalised { round: u32 },
    Scored(ScoringRun),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoringRun {
    pub standings_id: String,
    pub round: u32,
    /// A new snapshot was inserted rather than an existing one updated.
    pub inserted: bool,
    pub scored: usize,
    /// Approved entries with no prediction in force at the snapshot time.
    pub skipped: usize,
    pub failed: usize,
    /// Round whose "round complete" emails went out during this run.
    pub completed_round: Option<u32>,
    pub emails_sent: usize,
    pub email_failures: usize,
}

struct Upserted {
    standings: Standings,
    inserted: bool,
}

/// Polls the provider for a season's table, stores it as the snapshot for
/// its round and rescores every approved entry against it.
pub struct RetrieveLatestStandingsJob {
    name: String,
    season: Arc<Season>,
    ctx: JobContext,
}

impl RetrieveLatestStandingsJob {
    pub fn new(season: Arc<Season>, ctx: JobContext) -> Self {
        Self {
            name: format!("retrieve-latest-standings-{}", season.id).to_lowercase(),
            season,
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn fail(&self, step: &'static str) -> impl Fn(LeagueError) -> JobError + '_ {
        move |e| JobError::new(&self.name, step, e)
    }

    pub async fn execute(&self) -> Result<StandingsOutcome> {
        let now = self.ctx.clock.now();
        if !self.season.is_active_at(now) {
            debug!(job = %self.name, season_id = %self.season.id, "season is not active");
            return Ok(StandingsOutcome::SeasonInactive);
        }

        let latest = self
            .ctx
            .source
            .latest_standings(&self.season)
            .await
            .map_err(|e| JobError::new(&self.name, "fetch standings", e))?;

        let (round, rankings) = self.normalise(latest).map_err(self.fail("normalise standings"))?;

        let Upserted {
            mut standings,
            inserted,
        } = self
            .upsert(round, rankings)
            .map_err(self.fail("upsert standings"))?;

        let completed = self.season.is_completed_by(&standings.rankings);
        if completed && standings.finalised {
            debug!(job = %self.name, round, "final round already finalised");
            return Ok(StandingsOutcome::AlreadyFinalised { round });
        }

        let entries = self
            .ctx
            .store
            .entries
            .select_by_season_id(&self.season.id, true)
            .map_err(|e| JobError::new(&self.name, "load entries", e))?;

        let mut run = ScoringRun {
            standings_id: standings.id.clone(),
            round: standings.round_number,
            inserted,
            ..Default::default()
        };

        let mut scored = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.score_entry(entry, &standings) {
                Ok(Some(s)) => scored.push(s),
                Ok(None) => run.skipped += 1,
                Err(e) => {
                    warn!(
                        job = %self.name,
                        entry_id = %entry.id,
                        code = e.code(),
                        error = %e,
                        "cannot score entry"
                    );
                    run.failed += 1;
                }
            }
        }
        run.scored = scored.len();

        // finalised only after its emails have gone out
        let open_previous = self
            .open_previous_round(standings.round_number)
            .map_err(self.fail("load previous round"))?;
        if let Some(mut previous) = open_previous {
            let previous_scores = self
                .ctx
                .store
                .scored
                .select_by_standings_id(&previous.id)
                .map_err(|e| JobError::new(&self.name, "load previous round scores", e))?;
            let (sent, failed) = self.issue_round_complete(&previous, previous_scores, false).await;
            run.completed_round = Some(previous.round_number);
            run.emails_sent += sent;
            run.email_failures += failed;

            previous.finalised = true;
            let previous = self
                .ctx
                .store
                .standings
                .update(previous)
                .map_err(|e| JobError::new(&self.name, "finalise previous round", e))?;
            info!(job = %self.name, standings_id = %previous.id, round = previous.round_number, "round finalised");
        }

        if completed {
            let (sent, failed) = self.issue_round_complete(&standings, scored, true).await;
            run.completed_round = Some(standings.round_number);
            run.emails_sent += sent;
            run.email_failures += failed;

            standings.finalised = true;
            let standings = self
                .ctx
                .store
                .standings
                .update(standings)
                .map_err(|e| JobError::new(&self.name, "finalise standings", e))?;
            info!(job = %self.name, round = standings.round_number, "season complete, final round finalised");
        }

        Ok(StandingsOutcome::Scored(run))
    }

    /// Resolve provider ids to teams and fix the round number. Nothing is
    /// persisted if any row fails.
    fn normalise(&self, latest: ProviderStandings) -> league_core::Result<(u32, Vec<RankingWithMeta>)> {
        let matchday = latest.current_matchday;
        let mut rankings = Vec::with_capacity(latest.rows.len());

        for row in latest.rows {
            let team = self
                .ctx
                .registry
                .team_by_provider_id(&row.team_provider_id)
                .ok_or_else(|| {
                    LeagueError::SourceContract(format!(
                        "unknown team: provider id {}",
                        row.team_provider_id
                    ))
                })?;
            if !self.season.has_team(&team.id) {
                return Err(LeagueError::SourceContract(format!(
                    "team {} is not part of season {}",
                    team.id, self.season.id
                )));
            }
            rankings.push(RankingWithMeta {
                id: team.id.clone(),
                position: row.position,
                metadata: RankingMeta {
                    played_games: row.played_games,
                    points: row.points,
                    goals_for: row.goals_for,
                    goals_against: row.goals_against,
                    goal_difference: row.goal_difference,
                },
            });
        }

        let distinct: HashSet<_> = rankings.iter().map(|r| &r.id).collect();
        if distinct.len() != rankings.len() || distinct.len() != self.season.teams.len() {
            return Err(LeagueError::SourceContract(format!(
                "table lists {} distinct teams in {} rows, season {} has {}",
                distinct.len(),
                rankings.len(),
                self.season.id,
                self.season.teams.len()
            )));
        }

        sort_rankings(&mut rankings);

        // providers can lag on the matchday once every game is played
        let round = if self.season.is_completed_by(&rankings) {
            self.season.max_rounds
        } else {
            matchday
        };
        if round == 0 || round > self.season.max_rounds {
            return Err(LeagueError::SourceContract(format!(
                "round {round} is outside 1..={}",
                self.season.max_rounds
            )));
        }

        Ok((round, rankings))
    }

    fn upsert(&self, round: u32, rankings: Vec<RankingWithMeta>) -> league_core::Result<Upserted> {
        let repo = &self.ctx.store.standings;

        match repo.select_by_season_and_round(&self.season.id, round) {
            Ok(mut existing) => {
                existing.rankings = rankings;
                Ok(Upserted {
                    standings: repo.update(existing)?,
                    inserted: false,
                })
            }
            Err(e) if e.is_not_found() => {
                let standings = repo.insert(Standings {
                    id: String::new(),
                    season_id: self.season.id.clone(),
                    round_number: round,
                    rankings,
                    finalised: false,
                    created_at: self.ctx.clock.now(),
                    updated_at: None,
                })?;
                info!(job = %self.name, standings_id = %standings.id, round, "new round");
                Ok(Upserted {
                    standings,
                    inserted: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The snapshot for the round before `round`, when it exists and has not
    /// been finalised yet.
    fn open_previous_round(&self, round: u32) -> league_core::Result<Option<Standings>> {
        if round <= 1 {
            return Ok(None);
        }
        match self
            .ctx
            .store
            .standings
            .select_by_season_and_round(&self.season.id, round - 1)
        {
            Ok(s) if !s.finalised => Ok(Some(s)),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Score one entry against `standings` using the prediction it had in
    /// force when the table was observed. `None` when there was none.
    fn score_entry(
        &self,
        entry: &Entry,
        standings: &Standings,
    ) -> league_core::Result<Option<ScoredEntryPrediction>> {
        let store = &self.ctx.store;

        let prediction = match store
            .predictions
            .select_by_entry_id_and_timestamp(&entry.id, standings.observed_at())
        {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                debug!(job = %self.name, entry_id = %entry.id, "no prediction in force");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let result = score_prediction(&prediction.rankings, &team_ids(&standings.rankings))?;

        let scored = match store.scored.select_by_ids(&prediction.id, &standings.id) {
            Ok(mut existing) => {
                existing.rankings = result.rankings;
                existing.score = result.total;
                store.scored.update(existing)?
            }
            Err(e) if e.is_not_found() => store.scored.insert(ScoredEntryPrediction {
                entry_prediction_id: prediction.id,
                standings_id: standings.id.clone(),
                rankings: result.rankings,
                score: result.total,
                created_at: self.ctx.clock.now(),
                updated_at: None,
            })?,
            Err(e) => return Err(e.into()),
        };

        // an entry that resubmitted mid-round keeps one score per snapshot
        let dropped = store
            .scored
            .delete_superseded(&entry.id, &standings.id, &scored.entry_prediction_id)?;
        if dropped > 0 {
            debug!(job = %self.name, entry_id = %entry.id, dropped, "superseded scores removed");
        }
        Ok(Some(scored))
    }

    /// Email each scored entry its result for `standings`. Returns
    /// (sent, failed).
    async fn issue_round_complete(
        &self,
        standings: &Standings,
        scored: Vec<ScoredEntryPrediction>,
        final_round: bool,
    ) -> (usize, usize) {
        let total = scored.len();
        let limit = self.ctx.settings.concurrency;
        let ctx = self.ctx.clone();
        let season = self.season.clone();
        let standings = Arc::new(standings.clone());

        let failures = fan_out(scored, limit, move |sep: ScoredEntryPrediction| {
            let ctx = ctx.clone();
            let season = season.clone();
            let standings = standings.clone();
            async move {
                let prediction = ctx.store.predictions.select_by_id(&sep.entry_prediction_id)?;
                let entry = ctx.store.entries.select_by_id(&prediction.entry_id)?;
                let email = ctx
                    .composer
                    .round_complete(&entry, &season, &standings, &sep, final_round)?;
                ctx.sink.send(&email).await?;
                Ok::<(), LeagueError>(())
            }
        })
        .await;

        for e in &failures {
            warn!(job = %self.name, code = e.code(), error = %e, "round complete email failed");
        }
        (total - failures.len(), failures.len())
    }
}

#[async_trait]
impl Task for RetrieveLatestStandingsJob {
    async fn run(&self) {
        let deadline = self.ctx.settings.deadline;
        match within_deadline(&self.name, deadline, self.execute()).await {
            Ok(outcome) => debug!(job = %self.name, ?outcome, "job finished"),
            Err(e) => error!(job = %e.job, code = e.code(), error = %e, "job failed"),
        }
    }
}
