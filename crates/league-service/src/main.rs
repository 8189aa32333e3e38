use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use league_clients::{EmailSink, FootballDataClient, LogSink, MailgunClient};
use league_core::config::LeagueConfig;
use league_core::season::SeasonStatus;
use league_core::{Clock, Registry, SystemClock};
use league_jobs::{housekeeping_jobs, season_jobs, Composer, JobContext, JobSettings};
use league_scheduler::SchedulerEngine;
use league_store::Store;
use tracing::{info, warn};

/// Polls league standings, rescores predictions and emails entrants on a
/// schedule.
#[derive(Debug, Parser)]
#[command(name = "league-service", version)]
struct Cli {
    /// Config file. Defaults to $LEAGUE_CONFIG, then ./league.toml.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "league_service=info,league_jobs=info,league_scheduler=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = LeagueConfig::load(cli.config.as_deref()).context("cannot load config")?;
    config.validate()?;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    // schema migrations run here (idempotent)
    let store = Arc::new(Store::new(db, clock.clone())?);
    info!("database migrations complete");

    let registry = Arc::new(
        Registry::load(&config.reference.path)
            .with_context(|| format!("cannot load reference data from {}", config.reference.path))?,
    );
    info!(
        path = %config.reference.path,
        seasons = registry.seasons().count(),
        "reference data loaded"
    );

    let sink: Arc<dyn EmailSink> = match &config.mail.mailgun {
        Some(mailgun) => {
            info!(domain = %mailgun.domain, "sending email via mailgun");
            Arc::new(MailgunClient::new(mailgun))
        }
        None => {
            warn!("no mail provider configured, emails will only be logged");
            Arc::new(LogSink)
        }
    };

    let ctx = JobContext {
        store,
        registry: registry.clone(),
        source: Arc::new(FootballDataClient::new(&config.football_data)),
        sink,
        composer: Arc::new(Composer::new(&config.realms, registry.clone())),
        clock: clock.clone(),
        settings: JobSettings::from(&config.scheduler),
    };

    let mut engine = SchedulerEngine::new(chrono_tz::Europe::London);
    let now = clock.now();
    let mut seen = HashSet::new();

    for realm in &config.realms {
        // realms sharing a season share its jobs
        if !seen.insert(realm.season_id.as_str()) {
            continue;
        }
        let season = registry.season_by_id(&realm.season_id).with_context(|| {
            format!("realm '{}' refers to unknown season '{}'", realm.name, realm.season_id)
        })?;
        if season.status_at(now) == SeasonStatus::Elapsed {
            info!(season_id = %season.id, realm = %realm.name, "season has elapsed, no jobs scheduled");
            continue;
        }
        for job in season_jobs(&ctx, season)? {
            engine.register(job)?;
        }
    }
    for job in housekeeping_jobs(&ctx)? {
        engine.register(job)?;
    }
    if config.realms.is_empty() {
        warn!("no realms configured, only housekeeping jobs will run");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = tokio::spawn(engine.run(shutdown_rx));
    info!("league service running, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, waiting for in-flight jobs");
    let _ = shutdown_tx.send(true);
    scheduler.await?;

    info!("league service stopped");
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
