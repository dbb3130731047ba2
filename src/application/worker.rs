//! Worker pool for the in-process job queue.
//!
//! Pulls jobs from the queue and runs up to `concurrency` of them at once
//! through the [`JobRunner`]. Also enqueues the periodic system jobs: a
//! cron sweep aligned to the start of each minute, the cross-tenant
//! stuck-task recovery sweep, and the retention sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tokio::sync::{Notify, Semaphore};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapters::jobs::JobReceiver;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::WorkerConfig;
use crate::domain::ports::{Job, JobDispatcher};

use super::job_runner::JobRunner;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Stops a running [`Worker`].
#[derive(Clone)]
pub struct WorkerHandle {
    stop_flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl WorkerHandle {
    /// Stop taking new jobs; in-flight jobs finish first.
    pub fn shutdown(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }
}

pub struct Worker {
    runner: Arc<JobRunner>,
    dispatcher: Arc<dyn JobDispatcher>,
    config: WorkerConfig,
    stop_flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Worker {
    pub fn new(runner: Arc<JobRunner>, dispatcher: Arc<dyn JobDispatcher>, config: WorkerConfig) -> Self {
        Self {
            runner,
            dispatcher,
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            stop_flag: self.stop_flag.clone(),
            notify: self.notify.clone(),
        }
    }

    /// Run until shut down or until every dispatcher is dropped.
    pub async fn run(self, mut receiver: JobReceiver) -> DomainResult<()> {
        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let mut cron_tick = interval_at(minute_aligned_start(), Duration::from_secs(self.config.cron_interval_secs.max(1)));
        let mut recovery_tick = interval(Duration::from_secs(self.config.recovery_interval_secs.max(1)));
        let mut prune_tick = interval(PRUNE_INTERVAL);
        for tick in [&mut cron_tick, &mut recovery_tick, &mut prune_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        info!(concurrency, cron_interval_secs = self.config.cron_interval_secs, "worker started");

        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }

            tokio::select! {
                job = receiver.recv() => {
                    let Some(job) = job else {
                        debug!("job queue closed");
                        break;
                    };
                    let permit = semaphore.clone().acquire_owned().await
                        .map_err(|_| DomainError::ValidationFailed("Semaphore error".to_string()))?;
                    let runner = self.runner.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        // Failures are logged by the runner and recorded on rows.
                        let _ = runner.run(job).await;
                    });
                }
                _ = cron_tick.tick() => self.enqueue(Job::CronSweep).await,
                _ = recovery_tick.tick() => self.enqueue(Job::RecoverStuckTasks).await,
                _ = prune_tick.tick() => self.enqueue(Job::PruneFinished).await,
                () = self.notify.notified() => {}
            }
        }

        // Wait for in-flight jobs.
        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
        let _drained = semaphore
            .acquire_many(permits)
            .await
            .map_err(|_| DomainError::ValidationFailed("Semaphore error".to_string()))?;

        info!("worker stopped");
        Ok(())
    }

    async fn enqueue(&self, job: Job) {
        let kind = job.kind();
        if let Err(err) = self.dispatcher.dispatch(job).await {
            warn!(kind, error = %err, "failed to enqueue periodic job");
        }
    }
}

/// One second into the next minute, so each sweep lands inside the minute
/// it evaluates.
fn minute_aligned_start() -> Instant {
    let second = u64::from(Utc::now().second());
    Instant::now() + Duration::from_secs(61 - second.min(59))
}
