use async_trait::async_trait;
use league_scheduler::Task;
use tracing::{debug, error, info};

use crate::error::{JobError, Result};
use crate::{within_deadline, JobContext};

pub const PURGE_TOKENS_JOB: &str = "purge-expired-tokens";

/// Deletes tokens whose expiry has passed.
pub struct PurgeExpiredTokensJob {
    ctx: JobContext,
}

impl PurgeExpiredTokensJob {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }

    pub async fn execute(&self) -> Result<usize> {
        let removed = self
            .ctx
            .store
            .tokens
            .delete_expired(self.ctx.clock.now())
            .map_err(|e| JobError::new(PURGE_TOKENS_JOB, "delete expired tokens", e))?;
        if removed > 0 {
            info!(job = PURGE_TOKENS_JOB, removed, "expired tokens purged");
        }
        Ok(removed)
    }
}

#[async_trait]
impl Task for PurgeExpiredTokensJob {
    async fn run(&self) {
        match within_deadline(PURGE_TOKENS_JOB, self.ctx.settings.deadline, self.execute()).await {
            Ok(removed) => debug!(job = PURGE_TOKENS_JOB, removed, "job finished"),
            Err(e) => error!(job = %e.job, code = e.code(), error = %e, "job failed"),
        }
    }
}
