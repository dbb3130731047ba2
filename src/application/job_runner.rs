//! Adapter between the job runtime and the execution core.
//!
//! Every job runs through [`ContextGuard::run`] and establishes its own
//! context from its arguments: tenant jobs establish tenant and collective,
//! system jobs verify that no tenant is present. Scheduler continuations
//! are turned into re-enqueues here, so the core never talks to the queue
//! about its own rescheduling.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::errors::{ContextError, DomainError};
use crate::domain::ports::{Job, JobDispatcher, ScopeKind};
use crate::services::{
    AgentTaskScheduler, AutomationRunExecutor, ContextGuard, Continuation, CronSweepReport,
    CronTrigger, RecoveryReport, RunOutcome, SystemScope, TenantScope,
};

/// Floor on the re-arm delay after a failed scheduler step, so a persistent
/// store error does not spin the queue.
pub const ERROR_REARM_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum JobError {
    /// A dispatch bug. Never retried.
    #[error("Fatal context error: {0}")]
    Fatal(ContextError),

    #[error(transparent)]
    Domain(DomainError),
}

impl JobError {
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<DomainError> for JobError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Context(context) => Self::Fatal(context),
            other => Self::Domain(other),
        }
    }
}

impl From<ContextError> for JobError {
    fn from(err: ContextError) -> Self {
        Self::Fatal(err)
    }
}

/// What a job did.
#[derive(Debug, Clone, PartialEq)]
pub enum JobReport {
    AgentTasks(Continuation),
    AutomationRun(RunOutcome),
    CronSweep(CronSweepReport),
    Recovery(RecoveryReport),
    Pruned(u64),
}

pub struct JobRunner {
    scheduler: Arc<AgentTaskScheduler>,
    automation: Arc<AutomationRunExecutor>,
    cron: Arc<CronTrigger>,
    dispatcher: Arc<dyn JobDispatcher>,
    rearm_delay: Duration,
    retention_days: u32,
}

impl JobRunner {
    pub fn new(
        scheduler: Arc<AgentTaskScheduler>,
        automation: Arc<AutomationRunExecutor>,
        cron: Arc<CronTrigger>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            scheduler,
            automation,
            cron,
            dispatcher,
            rearm_delay: Duration::ZERO,
            retention_days: 30,
        }
    }

    pub fn with_rearm_delay(mut self, delay: Duration) -> Self {
        self.rearm_delay = delay;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Run one job in a clean context.
    pub async fn run(&self, job: Job) -> Result<JobReport, JobError> {
        let span = info_span!("job", kind = job.kind());
        let kind = job.kind();

        let result = ContextGuard::run(self.run_in_unit(job)).instrument(span).await;
        match &result {
            Err(JobError::Fatal(err)) => error!(kind, error = %err, "job failed with a context error; not retrying"),
            Err(JobError::Domain(err)) => warn!(kind, error = %err, "job failed"),
            Ok(_) => {}
        }
        result
    }

    async fn run_in_unit(&self, job: Job) -> Result<JobReport, JobError> {
        if job.scope() == ScopeKind::System {
            SystemScope::verify_no_tenant_context()?;
        }

        match job {
            Job::RunAgentTasks { tenant_id, agent_id } => {
                TenantScope::establish_tenant(tenant_id)?;
                self.run_agent_tasks(tenant_id, agent_id).await
            }
            Job::ExecuteAutomationRun {
                tenant_id,
                collective_id,
                run_id,
            } => {
                TenantScope::establish(tenant_id, collective_id)?;
                let outcome = self.automation.execute(run_id).await?;
                Ok(JobReport::AutomationRun(outcome))
            }
            Job::CronSweep => Ok(JobReport::CronSweep(self.cron.sweep(Utc::now()).await?)),
            Job::RecoverStuckTasks => Ok(JobReport::Recovery(self.scheduler.recover_all(Utc::now()).await?)),
            Job::PruneFinished => {
                let now = Utc::now();
                let runs = self.scheduler.prune(now, self.retention_days).await?;
                let claims = self.automation.prune_cascade_claims(now, self.retention_days).await?;
                Ok(JobReport::Pruned(runs + claims))
            }
        }
    }

    /// One scheduler step, re-armed unless the queue is idle, another
    /// invocation holds the slot, or the failure is a dispatch bug.
    async fn run_agent_tasks(&self, tenant_id: Uuid, agent_id: Uuid) -> Result<JobReport, JobError> {
        let result = self.scheduler.run_once(agent_id).await;
        let rearm = match &result {
            Ok(continuation) => *continuation == Continuation::Rearm,
            Err(err) => !err.is_fatal(),
        };

        if rearm {
            let next = Job::RunAgentTasks { tenant_id, agent_id };
            let delay = if result.is_ok() {
                self.rearm_delay
            } else {
                self.rearm_delay.max(ERROR_REARM_DELAY)
            };
            if let Err(err) = self.dispatcher.dispatch_after(next, delay).await {
                // A failed step reports its own error, not the re-arm's.
                if result.is_ok() {
                    return Err(err.into());
                }
                warn!(%agent_id, error = %err, "failed to re-arm agent queue");
            }
        }

        Ok(JobReport::AgentTasks(result?))
    }
}
