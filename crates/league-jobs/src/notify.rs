use std::future::Future;
use std::sync::Arc;

use league_core::LeagueError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

/// Run `work` once per item with at most `limit` invocations in flight.
///
/// Every failure is returned exactly once. Errors are buffered in a channel
/// sized to the item count and read only after every worker has been
/// joined. Dropping the returned future aborts all outstanding workers.
pub async fn fan_out<T, F, Fut>(items: Vec<T>, limit: usize, work: F) -> Vec<LeagueError>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), LeagueError>> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }

    let (tx, mut rx) = mpsc::channel(items.len());
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let work = Arc::new(work);
    let mut workers = JoinSet::new();

    for item in items {
        // wait for a slot before launching the next worker
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let tx = tx.clone();
        let work = work.clone();
        workers.spawn(async move {
            let _permit = permit;
            if let Err(e) = work(item).await {
                // capacity equals the item count, so this never waits
                let _ = tx.send(e).await;
            }
        });
    }
    drop(tx);

    let mut failures = Vec::new();
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "notification worker did not complete");
            failures.push(LeagueError::Internal(format!("worker aborted: {e}")));
        }
    }
    while let Ok(e) = rx.try_recv() {
        failures.push(e);
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_limit() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let (c, p, d) = (current.clone(), peak.clone(), done.clone());
        let failures = fan_out((0..35).collect(), 10, move |_: usize| {
            let (c, p, d) = (c.clone(), p.clone(), d.clone());
            async move {
                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                c.fetch_sub(1, Ordering::SeqCst);
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(failures.is_empty());
        assert_eq!(done.load(Ordering::SeqCst), 35);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 10, "peak concurrency {peak}");
        assert!(peak > 1);
    }

    #[tokio::test]
    async fn every_failure_reported_once() {
        let failures = fan_out((0..23).collect(), 4, |n: u32| async move {
            if n % 3 == 0 {
                Err(LeagueError::NotFound(format!("item {n}")))
            } else {
                Ok(())
            }
        })
        .await;

        let mut seen: Vec<String> = failures.iter().map(|e| e.to_string()).collect();
        seen.sort();
        let mut expected: Vec<String> = (0..23)
            .filter(|n| n % 3 == 0)
            .map(|n| format!("Not found: item {n}"))
            .collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn panicking_worker_is_a_failure() {
        let failures = fan_out(vec![1, 2, 3], 2, |n: u32| async move {
            if n == 2 {
                panic!("boom");
            }
            Ok(())
        })
        .await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].code(), "INTERNAL");
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let failures = fan_out(Vec::<u8>::new(), 10, |_| async { Ok(()) }).await;
        assert!(failures.is_empty());
    }
}
