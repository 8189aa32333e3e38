//! `league-scheduler`: in-memory cron dispatcher for the league's periodic jobs.
//!
//! # Overview
//!
//! Jobs are registered up front as `{name, cron spec, task}`. The
//! [`engine::SchedulerEngine`] wakes at the top of each minute, evaluates
//! every spec against the wall clock in its configured zone, and spawns the
//! matching tasks.
//!
//! | Guarantee | Behaviour |
//! |-----------|-----------|
//! | Per job   | at most one invocation in flight; overlapping ticks are dropped |
//! | Across jobs | no ordering; tasks run concurrently |
//! | Panics    | caught, logged with the job name, never reach the loop |
//! | Shutdown  | stops ticking, then waits for in-flight tasks |

pub mod engine;
pub mod error;
pub mod schedule;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use schedule::CronSpec;
pub use types::{FnTask, Job, Task};
