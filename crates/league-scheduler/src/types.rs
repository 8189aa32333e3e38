use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::schedule::CronSpec;

/// A parameterless, side-effecting unit of scheduled work.
///
/// Implementations own their error handling and deadlines: the engine treats
/// every invocation as complete once the future resolves.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self);
}

/// Adapter so closures returning boxed futures can be registered directly.
pub struct FnTask<F>(pub F);

#[async_trait]
impl<F> Task for FnTask<F>
where
    F: Fn() -> BoxFuture<'static, ()> + Send + Sync,
{
    async fn run(&self) {
        (self.0)().await
    }
}

/// A named task bound to a cron expression.
#[derive(Clone)]
pub struct Job {
    pub name: String,
    pub spec: CronSpec,
    pub task: Arc<dyn Task>,
}

impl Job {
    pub fn new(name: impl Into<String>, spec: &str, task: Arc<dyn Task>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            spec: CronSpec::parse(spec)?,
            task,
        })
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("spec", &self.spec.as_str())
            .finish()
    }
}
