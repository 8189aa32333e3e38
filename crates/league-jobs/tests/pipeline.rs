use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use league_clients::{
    Email, EmailSink, ProviderRow, ProviderStandings, SinkError, SourceError, StandingsSource,
};
use league_core::config::RealmConfig;
use league_core::{Clock, FixedClock, Registry, Season, Team, TeamId, TimeFrame};
use league_jobs::messages::{SUBJECT_FINAL_ROUND, SUBJECT_WINDOW_CLOSING, SUBJECT_WINDOW_OPEN};
use league_jobs::{
    housekeeping_jobs, season_jobs, within_deadline, Composer, JobContext, JobSettings,
    PredictionWindowJob, PurgeExpiredTokensJob, RetrieveLatestStandingsJob, StandingsOutcome,
    WindowOutcome,
};
use league_scheduler::SchedulerEngine;
use league_store::{Criteria, Entry, EntryPrediction, EntryStatus, Store, TokenType};

const SEASON_ID: &str = "202425";
const TEAMS: usize = 20;

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn team_id(n: usize) -> TeamId {
    TeamId(format!("t{n:02}"))
}

fn provider_id(n: usize) -> String {
    format!("{}", 1000 + n)
}

/// Standings source that answers with whatever the test last gave it.
struct ScriptedSource {
    next: Mutex<Option<ProviderStandings>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            next: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn respond(&self, standings: ProviderStandings) {
        *self.next.lock().unwrap() = Some(standings);
    }
}

#[async_trait]
impl StandingsSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn latest_standings(&self, _season: &Season) -> Result<ProviderStandings, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.next
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SourceError::Unavailable("nothing scripted".into()))
    }
}

/// Email sink that records every message and the peak number of sends in
/// flight at once.
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Email>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    reject: Option<String>,
    delay: Duration,
}

impl RecordingSink {
    fn rejecting(address: &str) -> Self {
        Self {
            reject: Some(address.to_string()),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|e| e.subject.clone()).collect()
    }
}

#[async_trait]
impl EmailSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, email: &Email) -> Result<(), SinkError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5) + self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.reject.as_deref() == Some(email.to.address.as_str()) {
            return Err(SinkError::Rejected {
                status: 400,
                body: "mailbox unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

fn season() -> Season {
    let frame = |from, until| TimeFrame::new(from, until).unwrap();
    Season {
        id: SEASON_ID.into(),
        name: "Premier League 2024/25".into(),
        provider_id: Some("2021".into()),
        active: frame(utc(2024, 8, 16, 0, 0), utc(2025, 5, 26, 0, 0)),
        entries_accepted: frame(utc(2024, 6, 1, 0, 0), utc(2024, 8, 16, 0, 0)),
        selections_accepted: vec![
            frame(utc(2024, 6, 1, 0, 0), utc(2024, 8, 16, 17, 0)),
            // 1pm 2 Sep to 12pm 9 Sep, BST
            frame(utc(2024, 9, 2, 12, 0), utc(2024, 9, 9, 11, 0)),
            frame(utc(2025, 1, 1, 12, 0), utc(2025, 1, 31, 12, 0)),
        ],
        teams: (1..=TEAMS).map(team_id).collect(),
        max_rounds: 38,
    }
}

fn registry() -> Registry {
    let teams = (1..=TEAMS)
        .map(|n| Team {
            id: team_id(n),
            name: format!("Team {n}"),
            short_name: format!("T{n}"),
            provider_id: provider_id(n),
        })
        .collect();
    Registry::from_parts(teams, vec![season()]).unwrap()
}

fn realm() -> RealmConfig {
    RealmConfig {
        name: "localhost".into(),
        season_id: SEASON_ID.into(),
        origin: "http://localhost".into(),
        sender_name: "Prediction League".into(),
        sender_address: "noreply@localhost.test".into(),
        reply_to_address: "hello@localhost.test".into(),
    }
}

/// Provider table in team-number order: team n finishes n-th.
fn table(matchday: u32, played: u32) -> ProviderStandings {
    ProviderStandings {
        current_matchday: matchday,
        rows: (1..=TEAMS)
            .map(|n| ProviderRow {
                position: n as u16,
                team_provider_id: provider_id(n),
                played_games: played,
                goals_for: 10,
                goals_against: 10,
                goal_difference: 0,
                points: (3 * (TEAMS - n)) as i32,
            })
            .collect(),
    }
}

struct Harness {
    clock: Arc<FixedClock>,
    store: Arc<Store>,
    source: Arc<ScriptedSource>,
    sink: Arc<RecordingSink>,
    season: Arc<Season>,
    ctx: JobContext,
}

impl Harness {
    fn new() -> Self {
        Self::with(ScriptedSource::new(), RecordingSink::default(), JobSettings::default())
    }

    fn with(source: ScriptedSource, sink: RecordingSink, settings: JobSettings) -> Self {
        let clock = Arc::new(FixedClock::new(utc(2024, 9, 20, 9, 0)));
        let store = Arc::new(Store::open_in_memory(clock.clone()).unwrap());
        let registry = Arc::new(registry());
        let source = Arc::new(source);
        let sink = Arc::new(sink);
        let ctx = JobContext {
            store: store.clone(),
            registry: registry.clone(),
            source: source.clone(),
            sink: sink.clone(),
            composer: Arc::new(Composer::new(&[realm()], registry)),
            clock: clock.clone(),
            settings,
        };
        Self {
            clock,
            store,
            source,
            sink,
            season: Arc::new(season()),
            ctx,
        }
    }

    fn entry(&self, code: &str, approved: bool) -> Entry {
        self.entry_in_realm(code, approved, "localhost")
    }

    fn entry_in_realm(&self, code: &str, approved: bool, realm: &str) -> Entry {
        self.store
            .entries
            .insert(Entry {
                id: String::new(),
                short_code: code.into(),
                season_id: SEASON_ID.into(),
                realm_name: realm.into(),
                entrant_name: format!("Entrant {code}"),
                entrant_nickname: code.into(),
                entrant_email: format!("{}@example.com", code.to_lowercase()),
                status: EntryStatus::Ready,
                payment_method: None,
                payment_ref: None,
                approved_at: approved.then(|| utc(2024, 8, 1, 9, 0)),
                created_at: self.clock.now(),
                updated_at: None,
            })
            .unwrap()
    }

    fn predict(&self, entry: &Entry, order: Vec<TeamId>) -> EntryPrediction {
        self.store
            .predictions
            .insert(EntryPrediction {
                id: String::new(),
                entry_id: entry.id.clone(),
                rankings: order,
                created_at: self.clock.now(),
            })
            .unwrap()
    }

    fn standings_job(&self) -> RetrieveLatestStandingsJob {
        RetrieveLatestStandingsJob::new(self.season.clone(), self.ctx.clone())
    }
}

fn in_order() -> Vec<TeamId> {
    (1..=TEAMS).map(team_id).collect()
}

/// Three approved entries scoring 0, 2 and 200 against `table`, plus one
/// unapproved entry that must be ignored.
fn seed_entries(h: &Harness) -> Vec<Entry> {
    let perfect = h.entry("AAA111", true);
    h.predict(&perfect, in_order());

    let swapped = h.entry("BBB222", true);
    let mut order = in_order();
    order.swap(0, 1);
    h.predict(&swapped, order);

    let reversed = h.entry("CCC333", true);
    h.predict(&reversed, in_order().into_iter().rev().collect());

    let pending = h.entry("DDD444", false);
    h.predict(&pending, in_order());

    vec![perfect, swapped, reversed]
}

fn scored(run: StandingsOutcome) -> league_jobs::ScoringRun {
    match run {
        StandingsOutcome::Scored(run) => run,
        other => panic!("expected a scoring run, got {other:?}"),
    }
}

#[tokio::test]
async fn fresh_snapshot_is_inserted_and_scored() {
    let h = Harness::new();
    let entries = seed_entries(&h);
    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(table(7, 7));

    let run = scored(h.standings_job().execute().await.unwrap());
    assert!(run.inserted);
    assert_eq!(run.round, 7);
    assert_eq!(run.scored, 3);
    assert_eq!((run.skipped, run.failed), (0, 0));

    let standings = h.store.standings.select_by_season_and_round(SEASON_ID, 7).unwrap();
    assert_eq!(standings.id, run.standings_id);
    assert_eq!(standings.rankings.len(), TEAMS);
    assert_eq!(standings.rankings[0].id, team_id(1));
    assert!(standings.updated_at.is_none());
    assert!(!standings.finalised);

    let scores = h.store.scored.select_by_standings_id(&standings.id).unwrap();
    assert_eq!(scores.len(), 3);
    let mut totals: Vec<i64> = scores.iter().map(|s| s.score).collect();
    totals.sort();
    assert_eq!(totals, vec![0, 2, 200]);
    assert!(scores.iter().all(|s| s.updated_at.is_none()));

    // scores belong to the approved entries only
    for entry in &entries {
        let p = h
            .store
            .predictions
            .select_by_entry_id_and_timestamp(&entry.id, standings.observed_at())
            .unwrap();
        assert!(h.store.scored.exists_by_ids(&p.id, &standings.id).is_ok());
    }
    assert!(h.sink.subjects().is_empty());
}

#[tokio::test]
async fn repeated_poll_updates_in_place() {
    let h = Harness::new();
    seed_entries(&h);
    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(table(7, 7));

    let first = scored(h.standings_job().execute().await.unwrap());
    h.clock.set(utc(2024, 10, 1, 12, 15));
    let second = scored(h.standings_job().execute().await.unwrap());

    assert!(!second.inserted);
    assert_eq!(second.standings_id, first.standings_id);
    assert_eq!(second.scored, 3);

    let all = h
        .store
        .standings
        .select(&Criteria::new().eq_str("season_id", SEASON_ID), false)
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].created_at, utc(2024, 10, 1, 12, 0));
    assert_eq!(all[0].updated_at, Some(utc(2024, 10, 1, 12, 15)));

    let scores = h.store.scored.select_by_standings_id(&first.standings_id).unwrap();
    assert_eq!(scores.len(), 3);
    assert!(scores.iter().all(|s| s.created_at == utc(2024, 10, 1, 12, 0)));
    assert!(scores.iter().all(|s| s.updated_at == Some(utc(2024, 10, 1, 12, 15))));
}

#[tokio::test]
async fn unknown_team_writes_nothing() {
    let h = Harness::new();
    seed_entries(&h);
    h.clock.set(utc(2024, 10, 1, 12, 0));
    let mut bad = table(7, 7);
    bad.rows[4].team_provider_id = "9999".into();
    h.source.respond(bad);

    let err = h.standings_job().execute().await.unwrap_err();
    assert_eq!(err.code(), "SOURCE_CONTRACT");
    assert!(err.to_string().contains("9999"), "{err}");

    let none = h
        .store
        .standings
        .select(&Criteria::new().eq_str("season_id", SEASON_ID), false)
        .unwrap_err();
    assert!(none.is_not_found());
    assert!(h.store.scored.select(&Criteria::new(), false).unwrap_err().is_not_found());
}

#[tokio::test]
async fn incomplete_table_breaks_contract() {
    let h = Harness::new();
    h.clock.set(utc(2024, 10, 1, 12, 0));
    let mut short = table(7, 7);
    short.rows.pop();
    h.source.respond(short);

    let err = h.standings_job().execute().await.unwrap_err();
    assert_eq!(err.code(), "SOURCE_CONTRACT");

    h.source.respond(table(39, 7));
    let err = h.standings_job().execute().await.unwrap_err();
    assert_eq!(err.code(), "SOURCE_CONTRACT");
}

#[tokio::test]
async fn source_outage_is_unavailable() {
    let h = Harness::new();
    h.clock.set(utc(2024, 10, 1, 12, 0));

    let err = h.standings_job().execute().await.unwrap_err();
    assert_eq!(err.code(), "SOURCE_UNAVAILABLE");
    assert!(err.to_string().starts_with("retrieve-latest-standings-202425: fetch standings"));
}

#[tokio::test]
async fn inactive_season_is_not_polled() {
    let h = Harness::new();
    h.clock.set(utc(2024, 8, 10, 12, 0));
    h.source.respond(table(1, 1));

    let outcome = h.standings_job().execute().await.unwrap();
    assert_eq!(outcome, StandingsOutcome::SeasonInactive);
    assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scores_use_prediction_in_force_when_observed() {
    let h = Harness::new();
    let entry = h.entry("EEE555", true);

    h.clock.set(utc(2024, 10, 1, 12, 0));
    let early = h.predict(&entry, in_order());

    h.clock.set(utc(2024, 10, 1, 12, 30));
    h.source.respond(table(7, 7));
    let run = scored(h.standings_job().execute().await.unwrap());

    h.clock.set(utc(2024, 10, 1, 13, 0));
    let late = h.predict(&entry, in_order().into_iter().rev().collect());

    let scores = h.store.scored.select_by_standings_id(&run.standings_id).unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].entry_prediction_id, early.id);
    assert_ne!(scores[0].entry_prediction_id, late.id);
    assert_eq!(scores[0].score, 0);
}

#[tokio::test]
async fn entry_without_prediction_is_skipped() {
    let h = Harness::new();
    seed_entries(&h);
    h.entry("FFF666", true);
    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(table(7, 7));

    let run = scored(h.standings_job().execute().await.unwrap());
    assert_eq!(run.scored, 3);
    assert_eq!(run.skipped, 1);
}

#[tokio::test]
async fn bad_prediction_does_not_block_others() {
    let h = Harness::new();
    seed_entries(&h);
    let odd = h.entry("GGG777", true);
    // predicts a team twice
    let mut order = in_order();
    order[19] = team_id(1);
    h.predict(&odd, order);

    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(table(7, 7));
    let run = scored(h.standings_job().execute().await.unwrap());
    assert_eq!(run.scored, 3);
    assert_eq!(run.failed, 1);
}

#[tokio::test]
async fn new_round_finalises_previous_and_sends_round_complete() {
    let h = Harness::new();
    seed_entries(&h);
    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(table(7, 7));
    let round7 = scored(h.standings_job().execute().await.unwrap());
    assert!(h.sink.subjects().is_empty());

    h.clock.set(utc(2024, 10, 8, 12, 0));
    h.source.respond(table(8, 8));
    let round8 = scored(h.standings_job().execute().await.unwrap());

    assert!(round8.inserted);
    assert_eq!(round8.completed_round, Some(7));
    assert_eq!(round8.emails_sent, 3);
    assert_eq!(round8.email_failures, 0);

    let previous = h.store.standings.select_by_season_and_round(SEASON_ID, 7).unwrap();
    assert_eq!(previous.id, round7.standings_id);
    assert!(previous.finalised);
    let current = h.store.standings.select_by_season_and_round(SEASON_ID, 8).unwrap();
    assert!(!current.finalised);

    let subjects = h.sink.subjects();
    assert_eq!(subjects.len(), 3);
    assert!(subjects.iter().all(|s| s == "End of Round 7"));
    let sent = h.sink.sent.lock().unwrap();
    assert!(sent.iter().all(|e| e.plain_text.contains("http://localhost/leaderboard")));
    assert!(sent.iter().all(|e| e.from.address == "noreply@localhost.test"));
}

#[tokio::test]
async fn resubmission_mid_round_keeps_one_score_per_entry() {
    let h = Harness::new();
    let entries = seed_entries(&h);
    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(table(7, 7));
    let first = scored(h.standings_job().execute().await.unwrap());

    // BBB222 fixes their swapped pair between two polls of the same round
    h.clock.set(utc(2024, 10, 1, 12, 5));
    let fixed = h.predict(&entries[1], in_order());
    h.clock.set(utc(2024, 10, 1, 12, 15));
    let second = scored(h.standings_job().execute().await.unwrap());
    assert_eq!(second.standings_id, first.standings_id);
    assert_eq!(second.scored, 3);

    let scores = h.store.scored.select_by_standings_id(&second.standings_id).unwrap();
    assert_eq!(scores.len(), 3);
    let current = scores
        .iter()
        .find(|s| s.entry_prediction_id == fixed.id)
        .expect("score for the resubmitted prediction");
    assert_eq!(current.score, 0);

    h.clock.set(utc(2024, 10, 8, 12, 0));
    h.source.respond(table(8, 8));
    let round8 = scored(h.standings_job().execute().await.unwrap());
    assert_eq!(round8.completed_round, Some(7));
    assert_eq!(round8.emails_sent, 3);

    let sent = h.sink.sent.lock().unwrap();
    let to_bbb: Vec<&Email> = sent
        .iter()
        .filter(|e| e.to.address == "bbb222@example.com")
        .collect();
    assert_eq!(to_bbb.len(), 1);
    assert!(to_bbb[0].plain_text.contains("Your score for this round is 0"));
}

#[tokio::test]
async fn interrupted_round_complete_is_sent_on_next_poll() {
    let h = Harness::with(
        ScriptedSource::new(),
        RecordingSink::slow(Duration::from_millis(200)),
        JobSettings::default(),
    );
    seed_entries(&h);
    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(table(7, 7));
    h.standings_job().execute().await.unwrap();

    // round 8 lands but the deadline cuts the round 7 emails short
    h.clock.set(utc(2024, 10, 8, 12, 0));
    h.source.respond(table(8, 8));
    let job = h.standings_job();
    let err = within_deadline(job.name(), Duration::from_millis(20), job.execute())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INTERNAL");
    assert!(h.sink.subjects().is_empty());
    assert!(h.store.standings.select_by_season_and_round(SEASON_ID, 8).is_ok());
    let round7 = h.store.standings.select_by_season_and_round(SEASON_ID, 7).unwrap();
    assert!(!round7.finalised);

    h.clock.set(utc(2024, 10, 8, 12, 15));
    let retry = scored(job.execute().await.unwrap());
    assert!(!retry.inserted);
    assert_eq!(retry.completed_round, Some(7));
    assert_eq!(retry.emails_sent, 3);
    let round7 = h.store.standings.select_by_season_and_round(SEASON_ID, 7).unwrap();
    assert!(round7.finalised);

    h.clock.set(utc(2024, 10, 8, 12, 30));
    let later = scored(job.execute().await.unwrap());
    assert_eq!(later.completed_round, None);
    assert_eq!(later.emails_sent, 0);
    let subjects = h.sink.subjects();
    assert_eq!(subjects.len(), 3);
    assert!(subjects.iter().all(|s| s == "End of Round 7"));
}

#[tokio::test]
async fn tied_rows_score_the_same_in_any_provider_order() {
    let h = Harness::new();
    let entries = seed_entries(&h);
    // predicts team 4 above team 3
    let mut order = in_order();
    order.swap(2, 3);
    h.predict(&h.entry("JJJ000", true), order);

    // teams 3 and 4 share third place
    let mut tied = table(7, 7);
    tied.rows[3].position = 3;
    tied.rows[3].points = tied.rows[2].points;
    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(tied.clone());
    let first = scored(h.standings_job().execute().await.unwrap());
    let before = h.store.scored.select_by_standings_id(&first.standings_id).unwrap();
    let stored_before = h.store.standings.select_by_season_and_round(SEASON_ID, 7).unwrap();

    tied.rows.swap(2, 3);
    h.clock.set(utc(2024, 10, 1, 12, 15));
    h.source.respond(tied);
    let second = scored(h.standings_job().execute().await.unwrap());
    let after = h.store.scored.select_by_standings_id(&second.standings_id).unwrap();
    let stored_after = h.store.standings.select_by_season_and_round(SEASON_ID, 7).unwrap();

    assert_eq!(stored_before.rankings, stored_after.rankings);
    assert_eq!(before.len(), entries.len() + 1);
    let scores = |rows: &[league_store::ScoredEntryPrediction]| {
        rows.iter()
            .map(|s| (s.entry_prediction_id.clone(), s.score))
            .collect::<Vec<_>>()
    };
    assert_eq!(scores(&before), scores(&after));
}

#[tokio::test]
async fn completed_season_finalises_last_round_once() {
    let h = Harness::new();
    seed_entries(&h);
    h.clock.set(utc(2025, 5, 25, 18, 0));
    // provider still reports matchday 37 although every game is played
    h.source.respond(table(37, 38));

    let run = scored(h.standings_job().execute().await.unwrap());
    assert_eq!(run.round, 38);
    assert_eq!(run.completed_round, Some(38));
    assert_eq!(run.emails_sent, 3);

    let last = h.store.standings.select_by_season_and_round(SEASON_ID, 38).unwrap();
    assert!(last.finalised);
    assert!(h.sink.subjects().iter().all(|s| s == SUBJECT_FINAL_ROUND));

    h.clock.set(utc(2025, 5, 25, 18, 15));
    let again = h.standings_job().execute().await.unwrap();
    assert_eq!(again, StandingsOutcome::AlreadyFinalised { round: 38 });
    assert_eq!(h.sink.subjects().len(), 3);
}

#[tokio::test]
async fn slow_source_hits_deadline() {
    let settings = JobSettings {
        deadline: Duration::from_millis(50),
        ..JobSettings::default()
    };
    let h = Harness::with(
        ScriptedSource::slow(Duration::from_secs(5)),
        RecordingSink::default(),
        settings,
    );
    h.clock.set(utc(2024, 10, 1, 12, 0));
    h.source.respond(table(7, 7));

    let job = h.standings_job();
    let err = within_deadline(job.name(), settings.deadline, job.execute())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INTERNAL");
    assert!(h.store.standings.select(&Criteria::new(), false).is_err());
}

#[tokio::test]
async fn window_open_matches_on_following_day() {
    let h = Harness::new();
    for n in 0..25 {
        h.entry(&format!("W{n:05}"), true);
    }
    h.entry("ZZZ999", false);

    // 12:34 BST on the day the window opens at 13:00
    h.clock.set(utc(2024, 9, 2, 11, 34));
    let job = PredictionWindowJob::opening(h.season.clone(), h.ctx.clone());
    assert_eq!(job.execute().await.unwrap(), WindowOutcome::NoWindow);
    assert!(h.sink.subjects().is_empty());

    h.clock.set(utc(2024, 9, 3, 11, 34));
    let outcome = job.execute().await.unwrap();
    assert_eq!(
        outcome,
        WindowOutcome::Notified {
            window: 2,
            of: 3,
            sent: 25,
            failed: 0
        }
    );
    let subjects = h.sink.subjects();
    assert_eq!(subjects.len(), 25);
    assert!(subjects.iter().all(|s| s == SUBJECT_WINDOW_OPEN));

    let peak = h.sink.peak.load(Ordering::SeqCst);
    assert!(peak <= 10, "peak concurrency {peak}");
}

#[tokio::test]
async fn window_closing_warns_the_day_before() {
    let h = Harness::new();
    seed_entries(&h);
    let job = PredictionWindowJob::closing(h.season.clone(), h.ctx.clone());

    // 16:48 BST, two days out
    h.clock.set(utc(2024, 9, 7, 15, 48));
    assert_eq!(job.execute().await.unwrap(), WindowOutcome::NoWindow);

    h.clock.set(utc(2024, 9, 8, 15, 48));
    let outcome = job.execute().await.unwrap();
    assert!(matches!(outcome, WindowOutcome::Notified { window: 2, sent: 3, .. }));
    assert!(h.sink.subjects().iter().all(|s| s == SUBJECT_WINDOW_CLOSING));
    let sent = h.sink.sent.lock().unwrap();
    assert!(sent[0].plain_text.contains("12:00pm on Mon 9 September"));
}

#[tokio::test]
async fn per_entry_failures_are_counted_not_fatal() {
    let h = Harness::with(
        ScriptedSource::new(),
        RecordingSink::rejecting("bbb222@example.com"),
        JobSettings::default(),
    );
    seed_entries(&h);
    h.entry_in_realm("HHH888", true, "nowhere");

    h.clock.set(utc(2024, 9, 3, 11, 34));
    let job = PredictionWindowJob::opening(h.season.clone(), h.ctx.clone());
    let outcome = job.execute().await.unwrap();
    assert_eq!(
        outcome,
        WindowOutcome::Notified {
            window: 2,
            of: 3,
            sent: 2,
            failed: 2
        }
    );
    assert_eq!(h.sink.subjects().len(), 2);
}

#[tokio::test]
async fn expired_tokens_are_purged() {
    let h = Harness::new();
    let stale = h.store.tokens.insert(TokenType::Auth, "a").unwrap();
    h.clock.set(utc(2024, 9, 20, 9, 30));
    let fresh = h.store.tokens.insert(TokenType::Prediction, "b").unwrap();

    let removed = PurgeExpiredTokensJob::new(h.ctx.clone()).execute().await.unwrap();
    assert_eq!(removed, 1);
    assert!(h.store.tokens.select_by_id(&stale.id).unwrap_err().is_not_found());
    assert!(h.store.tokens.select_by_id(&fresh.id).is_ok());
}

#[tokio::test]
async fn jobs_register_with_expected_schedules() {
    let h = Harness::new();
    let mut engine = SchedulerEngine::new(chrono_tz::Europe::London);
    for job in season_jobs(&h.ctx, &h.season).unwrap() {
        engine.register(job).unwrap();
    }
    for job in housekeeping_jobs(&h.ctx).unwrap() {
        engine.register(job).unwrap();
    }

    let mut names = engine.job_names();
    names.sort();
    assert_eq!(
        names,
        vec![
            "prediction-window-closing-202425",
            "prediction-window-open-202425",
            "purge-expired-tokens",
            "retrieve-latest-standings-202425",
        ]
    );

    let after = utc(2024, 9, 2, 0, 0);
    assert_eq!(
        engine.next_run("prediction-window-open-202425", after).unwrap(),
        Some(utc(2024, 9, 2, 11, 34))
    );
    assert_eq!(
        engine.next_run("prediction-window-closing-202425", after).unwrap(),
        Some(utc(2024, 9, 2, 15, 48))
    );
    assert_eq!(
        engine.next_run("retrieve-latest-standings-202425", after).unwrap(),
        Some(utc(2024, 9, 2, 0, 15))
    );

    let mut unpolled = (*h.season).clone();
    unpolled.provider_id = None;
    assert_eq!(season_jobs(&h.ctx, &unpolled).unwrap().len(), 2);
}
