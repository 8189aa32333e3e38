use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use chrono_tz::Tz;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SchedulerError};
use crate::types::Job;

struct Slot {
    job: Job,
    /// Set while an invocation is in flight; a tick that finds it set is dropped.
    running: Arc<AtomicBool>,
}

/// Clears a slot's running flag however the task future ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// In-memory cron dispatcher. Evaluates every registered job once per
/// wall-clock minute in a fixed time zone and runs matching tasks on the
/// Tokio runtime: sequential per job, concurrent across jobs.
pub struct SchedulerEngine {
    tz: Tz,
    slots: Vec<Slot>,
    in_flight: JoinSet<()>,
    last_tick: Option<DateTime<Utc>>,
}

impl SchedulerEngine {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            slots: Vec::new(),
            in_flight: JoinSet::new(),
            last_tick: None,
        }
    }

    /// Add a job. Names are unique.
    pub fn register(&mut self, job: Job) -> Result<()> {
        if self.slots.iter().any(|s| s.job.name == job.name) {
            return Err(SchedulerError::DuplicateJob(job.name));
        }
        info!(job = %job.name, spec = %job.spec, "job registered");
        self.slots.push(Slot {
            job,
            running: Arc::new(AtomicBool::new(false)),
        });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.job.name.as_str()).collect()
    }

    /// When the named job would next fire after `after`.
    pub fn next_run(&self, name: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let slot = self
            .slots
            .iter()
            .find(|s| s.job.name == name)
            .ok_or_else(|| SchedulerError::JobNotFound {
                name: name.to_string(),
            })?;
        Ok(slot.job.spec.next_after(after, &self.tz))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Dispatch every job whose spec matches `now`. Returns how many tasks
    /// were started; overlapping ticks are dropped, not queued.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> usize {
        let local = now.with_timezone(&self.tz);
        let mut started = 0;

        for slot in &self.slots {
            if !slot.job.spec.matches(&local) {
                continue;
            }
            if slot.running.swap(true, Ordering::AcqRel) {
                warn!(job = %slot.job.name, "previous run still in progress; tick dropped");
                continue;
            }

            let guard = RunningGuard(slot.running.clone());
            let task = slot.job.task.clone();
            let name = slot.job.name.clone();
            debug!(job = %name, "dispatching job");

            self.in_flight.spawn(async move {
                let _guard = guard;
                if let Err(panic) = AssertUnwindSafe(task.run()).catch_unwind().await {
                    error!(job = %name, panic = %panic_message(&panic), "job panicked");
                }
            });
            started += 1;
        }
        started
    }

    /// Wait for every in-flight task to return.
    pub async fn drain(&mut self) {
        while let Some(res) = self.in_flight.join_next().await {
            if let Err(e) = res {
                error!("scheduled task aborted: {e}");
            }
        }
    }

    /// Main loop. Ticks at the top of every minute until `shutdown`
    /// broadcasts `true`, then waits for in-flight tasks.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(jobs = self.slots.len(), tz = %self.tz, "scheduler engine started");

        let mut interval = tokio::time::interval_at(
            Instant::now() + until_next_minute(Utc::now()),
            std::time::Duration::from_secs(60),
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // timers can wake a hair early; snap to the nearest minute
                    let Ok(minute) = (Utc::now() + Duration::seconds(5))
                        .duration_trunc(Duration::minutes(1)) else {
                        continue;
                    };
                    if self.last_tick == Some(minute) {
                        continue;
                    }
                    self.last_tick = Some(minute);
                    self.tick_at(minute);
                }
                Some(res) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = res {
                        error!("scheduled task aborted: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(in_flight = self.in_flight.len(), "scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        self.drain().await;
        info!("scheduler engine stopped");
    }
}

fn until_next_minute(now: DateTime<Utc>) -> std::time::Duration {
    let into_minute = now.timestamp_subsec_millis() as u64 + (now.timestamp() as u64 % 60) * 1000;
    std::time::Duration::from_millis(60_000 - into_minute)
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
