//! Dispatcher that records jobs instead of running them.
//!
//! Used by tests and by one-shot CLI commands that only need to know what
//! would have been enqueued.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{Job, JobDispatcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedJob {
    pub job: Job,
    pub delay: Duration,
}

#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    jobs: Arc<Mutex<Vec<DispatchedJob>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job dispatched so far, oldest first.
    pub fn dispatched(&self) -> Vec<DispatchedJob> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.dispatched().into_iter().map(|d| d.job).collect()
    }

    /// Remove and return every recorded job.
    pub fn take(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .map(|mut jobs| jobs.drain(..).map(|d| d.job).collect())
            .unwrap_or_default()
    }

    fn record(&self, job: Job, delay: Duration) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push(DispatchedJob { job, delay });
        }
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: Job) -> DomainResult<()> {
        self.record(job, Duration::ZERO);
        Ok(())
    }

    async fn dispatch_after(&self, job: Job, delay: Duration) -> DomainResult<()> {
        self.record(job, delay);
        Ok(())
    }
}
