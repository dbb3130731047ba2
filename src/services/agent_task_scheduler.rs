//! Per-agent serialized task queue.
//!
//! Each `(tenant, agent)` pair has at most one task running. An invocation
//! of [`AgentTaskScheduler::run_once`] claims at most one task, executes it,
//! and reports a [`Continuation`]; the job runner turns `Rearm` into a new
//! dispatch for the same pair. A crashed invocation therefore only delays
//! the queue: the next invocation force-fails the stuck row and moves on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentTaskRun, SchedulerConfig, TaskResult};
use crate::domain::ports::{
    AgentTaskExecutor, AgentTaskRunRepository, ClaimOutcome, ClaimResult, Job, JobDispatcher,
};

use super::execution_context::ExecutionContext;
use super::scope::{SystemScope, TenantScope};

/// What the job runner should do after one scheduler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// A task was executed; dispatch the pair again to pick up the next one.
    Rearm,
    /// Nothing queued.
    Idle,
    /// Another invocation holds the running slot and re-arms when done.
    Busy,
}

/// Result of a cross-tenant stuck-task sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub agents_kicked: usize,
}

pub struct AgentTaskScheduler {
    runs: Arc<dyn AgentTaskRunRepository>,
    executor: Arc<dyn AgentTaskExecutor>,
    dispatcher: Arc<dyn JobDispatcher>,
    stuck_timeout: Duration,
}

impl AgentTaskScheduler {
    pub fn new(
        runs: Arc<dyn AgentTaskRunRepository>,
        executor: Arc<dyn AgentTaskExecutor>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            runs,
            executor,
            dispatcher,
            stuck_timeout: config.stuck_timeout(),
        }
    }

    /// Queue a task for an agent of the current tenant and kick its queue.
    pub async fn enqueue_task(
        &self,
        agent_id: Uuid,
        task_description: impl Into<String> + Send,
    ) -> DomainResult<AgentTaskRun> {
        let tenant_id = TenantScope::require_tenant()?;
        let run = AgentTaskRun::queued(tenant_id, agent_id, task_description);
        self.runs.insert(&run).await?;
        info!(run_id = %run.id, %agent_id, %tenant_id, "agent task queued");

        self.on_agent_task_queue_changed(agent_id, tenant_id).await?;
        Ok(run)
    }

    /// (Re)kick the claim loop for one `(agent, tenant)` pair.
    pub async fn on_agent_task_queue_changed(&self, agent_id: Uuid, tenant_id: Uuid) -> DomainResult<()> {
        self.dispatcher
            .dispatch(Job::RunAgentTasks { tenant_id, agent_id })
            .await
    }

    /// Recover stuck tasks, then claim the oldest queued task of `agent_id`
    /// unless one is still running.
    pub async fn claim_next(&self, agent_id: Uuid, now: DateTime<Utc>) -> DomainResult<ClaimOutcome> {
        let tenant_id = TenantScope::require_tenant()?;
        let stuck_before = now - self.stuck_timeout;
        let outcome = self.runs.claim_next(tenant_id, agent_id, now, stuck_before).await?;

        for run_id in &outcome.recovered {
            warn!(%run_id, %agent_id, %tenant_id, "stuck agent task marked failed");
        }
        match &outcome.result {
            ClaimResult::Claimed(run) => {
                debug!(run_id = %run.id, %agent_id, %tenant_id, "agent task claimed");
            }
            ClaimResult::Busy => debug!(%agent_id, %tenant_id, "agent busy; leaving queue"),
            ClaimResult::Empty => debug!(%agent_id, %tenant_id, "agent queue empty"),
        }
        Ok(outcome)
    }

    /// Claim and execute at most one task.
    ///
    /// Execution failures, including panics inside the executor, are
    /// recorded on the run and still yield [`Continuation::Rearm`].
    pub async fn run_once(&self, agent_id: Uuid) -> DomainResult<Continuation> {
        let outcome = self.claim_next(agent_id, Utc::now()).await?;
        match outcome.result {
            ClaimResult::Claimed(run) => {
                self.execute(&run).await?;
                Ok(Continuation::Rearm)
            }
            ClaimResult::Busy => Ok(Continuation::Busy),
            ClaimResult::Empty => Ok(Continuation::Idle),
        }
    }

    async fn execute(&self, run: &AgentTaskRun) -> DomainResult<()> {
        ExecutionContext::set_agent_task_run(Some(run.id))?;

        let result = match AssertUnwindSafe(self.executor.execute(run)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => TaskResult::failed(format!("{:#}", err)),
            Err(panic) => TaskResult::failed(format!("executor panicked: {}", panic_message(&*panic))),
        };

        let finished = self.runs.finish(run.tenant_id, run.id, &result, Utc::now()).await;
        ExecutionContext::set_agent_task_run(None)?;

        if finished? {
            info!(
                run_id = %run.id,
                agent_id = %run.agent_id,
                status = %result.status(),
                tokens = result.total_tokens(),
                "agent task finished"
            );
        } else {
            warn!(run_id = %run.id, "agent task was no longer running when it finished; result dropped");
        }
        Ok(())
    }

    /// Cross-tenant sweep: kick every pair that has a stuck running row so
    /// its next claim recovers it, even if nothing new is enqueued.
    pub async fn recover_all(&self, now: DateTime<Utc>) -> DomainResult<RecoveryReport> {
        SystemScope::verify_no_tenant_context()?;
        let stuck = self.runs.find_stuck(now - self.stuck_timeout).await?;

        let mut report = RecoveryReport::default();
        for pair in stuck {
            SystemScope::with_tenant(pair.tenant_id, || async {
                let tenant_id = TenantScope::require_tenant()?;
                self.on_agent_task_queue_changed(pair.agent_id, tenant_id).await
            })
            .await??;
            report.agents_kicked += 1;
        }

        if report.agents_kicked > 0 {
            info!(agents = report.agents_kicked, "kicked agents with stuck tasks");
        }
        Ok(report)
    }

    /// Delete terminal runs finished more than `retention_days` ago.
    pub async fn prune(&self, now: DateTime<Utc>, retention_days: u32) -> DomainResult<u64> {
        SystemScope::verify_no_tenant_context()?;
        let cutoff = now - Duration::days(i64::from(retention_days));
        let deleted = self.runs.delete_finished_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, %cutoff, "pruned finished agent task runs");
        }
        Ok(deleted)
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
