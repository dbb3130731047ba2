//! In-process job queue over a tokio channel.
//!
//! Stands in for an external job runtime when the worker runs as a single
//! process. Delayed jobs are held by a sleeping task and enqueued when the
//! delay elapses; they are lost if the process exits first, which the
//! periodic recovery sweep tolerates.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{Job, JobDispatcher};

/// Receiving end of the in-process queue, consumed by the worker.
pub type JobReceiver = mpsc::UnboundedReceiver<Job>;

#[derive(Clone)]
pub struct InProcessDispatcher {
    sender: mpsc::UnboundedSender<Job>,
}

impl InProcessDispatcher {
    pub fn new() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl JobDispatcher for InProcessDispatcher {
    async fn dispatch(&self, job: Job) -> DomainResult<()> {
        trace!(kind = job.kind(), "job enqueued");
        self.sender
            .send(job)
            .map_err(|e| DomainError::DispatchFailed(format!("job queue closed; dropped {}", e.0.kind())))
    }

    async fn dispatch_after(&self, job: Job, delay: Duration) -> DomainResult<()> {
        if delay.is_zero() {
            return self.dispatch(job).await;
        }
        if self.sender.is_closed() {
            return Err(DomainError::DispatchFailed("job queue closed".to_string()));
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = sender.send(job) {
                warn!(kind = e.0.kind(), "job queue closed before delayed job was due");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_dispatch_delivers_in_order() {
        let (dispatcher, mut receiver) = InProcessDispatcher::new();
        dispatcher.dispatch(Job::CronSweep).await.unwrap();
        dispatcher.dispatch(Job::PruneFinished).await.unwrap();

        assert_eq!(receiver.recv().await, Some(Job::CronSweep));
        assert_eq!(receiver.recv().await, Some(Job::PruneFinished));
    }

    #[tokio::test]
    async fn test_dispatch_after_waits_for_delay() {
        let (dispatcher, mut receiver) = InProcessDispatcher::new();
        let job = Job::RunAgentTasks {
            tenant_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
        };
        dispatcher
            .dispatch_after(job.clone(), Duration::from_millis(50))
            .await
            .unwrap();

        assert!(receiver.try_recv().is_err());
        let delivered = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap();
        assert_eq!(delivered, Some(job));
    }

    #[tokio::test]
    async fn test_dispatch_fails_when_closed() {
        let (dispatcher, receiver) = InProcessDispatcher::new();
        drop(receiver);
        assert!(matches!(
            dispatcher.dispatch(Job::CronSweep).await,
            Err(DomainError::DispatchFailed(_))
        ));
    }
}
