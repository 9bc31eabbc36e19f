//! Bounded-concurrency task harness shared by every stage.
//!
//! [`TaskPool::run`] takes a list of independent items and a worker and
//! guarantees:
//!
//! - at most `max_concurrency` workers run at once (one semaphore permit per
//!   running item, acquired before the task is spawned)
//! - `run` returns only after every spawned item finished
//! - a failing or panicking item is counted and logged, never propagated to
//!   its siblings
//!
//! Counters are atomics shared by the workers. Outputs of successful items
//! come back in completion order.
//!
//! A [`CancellationToken`] stops the pool from starting new items and
//! abandons running async workers; an optional per-task deadline counts an
//! overdue async item as failed and frees its slot.
//!
//! Blocking workers ([`TaskPool::run_blocking`]) cannot be interrupted. An
//! item that has not started when the token fires is skipped, but a started
//! one keeps its slot until it returns and is counted by its own result. The
//! deadline is advisory for them: an overrun is logged, not enforced. Workers
//! that must stop early capture [`TaskPool::cancellation_token`] themselves.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::progress::{StageProgressEvent, StageProgressReporter};

/// Aggregate outcome of one [`TaskPool::run`].
#[derive(Debug)]
pub struct PoolReport<R> {
    pub outputs: Vec<R>,
    pub succeeded: u64,
    pub failed: u64,
    /// Items never started, or abandoned, because the pool was cancelled.
    pub skipped: u64,
}

impl<R> PoolReport<R> {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed + self.skipped
    }
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn finished(&self) -> u64 {
        self.succeeded.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst)
    }
}

enum Outcome<R> {
    Finished(Result<R>),
    TimedOut(Duration),
    Cancelled,
}

#[derive(Clone)]
pub struct TaskPool {
    stage: String,
    max_concurrency: usize,
    cancel: CancellationToken,
    task_timeout: Option<Duration>,
    progress: Option<Arc<dyn StageProgressReporter>>,
}

impl TaskPool {
    /// A pool running at most `max_concurrency` items at once (minimum 1).
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            stage: "pool".to_string(),
            max_concurrency: max_concurrency.max(1),
            cancel: CancellationToken::new(),
            task_timeout: None,
            progress: None,
        }
    }

    /// Name used in logs and progress events.
    pub fn named(mut self, stage: &str) -> Self {
        self.stage = stage.to_string();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn with_progress(mut self, reporter: Arc<dyn StageProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `worker` over every item and wait for all of them.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> PoolReport<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.drive(items, move |item, cancel, deadline| {
            let work = worker(item);
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Outcome::Cancelled,
                    outcome = with_deadline(work, deadline) => outcome,
                }
            }
        })
        .await
    }

    /// Like [`TaskPool::run`] for synchronous workers, which run on the
    /// blocking thread pool. A started worker always runs to completion
    /// while holding its slot.
    pub async fn run_blocking<T, R, F>(&self, items: Vec<T>, worker: F) -> PoolReport<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Result<R> + Send + Sync + 'static,
    {
        let worker = Arc::new(worker);
        let stage = self.stage.clone();
        self.drive(items, move |item, cancel, deadline| {
            let worker = worker.clone();
            let stage = stage.clone();
            async move {
                let mut handle = tokio::task::spawn_blocking(move || {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(worker(item))
                });
                let joined = match deadline {
                    Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            warn!(
                                stage = %stage,
                                timeout_ms = limit.as_millis() as u64,
                                "blocking item overran its deadline; waiting for it"
                            );
                            handle.await
                        }
                    },
                    None => handle.await,
                };
                match joined {
                    Ok(Some(result)) => Outcome::Finished(result),
                    Ok(None) => Outcome::Cancelled,
                    Err(e) => Outcome::Finished(Err(anyhow!("blocking worker panicked: {}", e))),
                }
            }
        })
        .await
    }

    /// Spawn one task per item, each holding a semaphore permit until `task`
    /// resolves, and fold the outcomes into a report.
    async fn drive<T, R, F, Fut>(&self, items: Vec<T>, task: F) -> PoolReport<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T, CancellationToken, Option<Duration>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<R>> + Send + 'static,
    {
        let total = items.len() as u64;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let counters = Arc::new(Counters::default());
        let mut set = JoinSet::new();

        info!(
            stage = %self.stage,
            items = total,
            max_concurrency = self.max_concurrency,
            "starting pool"
        );

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                counters.skipped.fetch_add(1, Ordering::SeqCst);
                continue;
            };

            let work = task(item, self.cancel.clone(), self.task_timeout);
            let counters = counters.clone();
            let progress = self.progress.clone();
            let stage = self.stage.clone();

            set.spawn(async move {
                let _permit = permit;
                let output = match work.await {
                    Outcome::Finished(Ok(output)) => {
                        counters.succeeded.fetch_add(1, Ordering::SeqCst);
                        Some(output)
                    }
                    Outcome::Finished(Err(e)) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        warn!(stage = %stage, error = %format!("{:#}", e), "item failed");
                        None
                    }
                    Outcome::TimedOut(limit) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        warn!(stage = %stage, timeout_ms = limit.as_millis() as u64, "item timed out");
                        None
                    }
                    Outcome::Cancelled => {
                        counters.skipped.fetch_add(1, Ordering::SeqCst);
                        debug!(stage = %stage, "item abandoned after cancellation");
                        return None;
                    }
                };
                report(progress.as_deref(), &stage, &counters, total);
                output
            });
        }

        let mut outputs = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(output)) => outputs.push(output),
                Ok(None) => {}
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    warn!(stage = %self.stage, error = %e, "worker panicked");
                    report(self.progress.as_deref(), &self.stage, &counters, total);
                }
            }
        }

        let report = PoolReport {
            outputs,
            succeeded: counters.succeeded.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            skipped: counters.skipped.load(Ordering::SeqCst),
        };
        info!(
            stage = %self.stage,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "pool finished"
        );
        report
    }
}

/// Per-run pool settings shared by every stage.
#[derive(Clone)]
pub struct PoolSettings {
    pub threads: usize,
    pub task_timeout: Option<Duration>,
    pub cancel: CancellationToken,
    pub progress: Option<Arc<dyn StageProgressReporter>>,
}

impl PoolSettings {
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            task_timeout: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// A pool for `stage` carrying these settings.
    pub fn pool(&self, stage: &str) -> TaskPool {
        let mut pool = TaskPool::new(self.threads)
            .named(stage)
            .with_cancellation(self.cancel.clone());
        if let Some(timeout) = self.task_timeout {
            pool = pool.with_task_timeout(timeout);
        }
        if let Some(progress) = &self.progress {
            pool = pool.with_progress(progress.clone());
        }
        pool
    }
}

/// Run one fallible closure on the blocking thread pool.
pub async fn blocking<R, F>(f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(anyhow!("blocking task panicked: {}", e)),
    }
}

async fn with_deadline<R, Fut>(fut: Fut, deadline: Option<Duration>) -> Outcome<R>
where
    Fut: Future<Output = Result<R>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => Outcome::Finished(result),
            Err(_) => Outcome::TimedOut(limit),
        },
        None => Outcome::Finished(fut.await),
    }
}

fn report(progress: Option<&dyn StageProgressReporter>, stage: &str, counters: &Counters, total: u64) {
    if let Some(progress) = progress {
        progress.report(StageProgressEvent::Processing {
            stage: stage.to_string(),
            done: counters.finished(),
            failed: counters.failed.load(Ordering::SeqCst),
            total,
        });
    }
}
