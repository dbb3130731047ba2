//! Port to the job runtime that dispatches units of work.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Which scope contract a job runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Establishes its tenant from its own arguments.
    Tenant,
    /// Must run with no tenant context at all.
    System,
}

/// A named unit of work with serialized arguments.
///
/// Tenant identifiers travel explicitly in the arguments; nothing is read
/// from ambient state when a job starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    RunAgentTasks {
        tenant_id: Uuid,
        agent_id: Uuid,
    },
    ExecuteAutomationRun {
        tenant_id: Uuid,
        collective_id: Option<Uuid>,
        run_id: Uuid,
    },
    CronSweep,
    RecoverStuckTasks,
    PruneFinished,
}

impl Job {
    pub const fn scope(&self) -> ScopeKind {
        match self {
            Self::RunAgentTasks { .. } | Self::ExecuteAutomationRun { .. } => ScopeKind::Tenant,
            Self::CronSweep | Self::RecoverStuckTasks | Self::PruneFinished => ScopeKind::System,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RunAgentTasks { .. } => "run_agent_tasks",
            Self::ExecuteAutomationRun { .. } => "execute_automation_run",
            Self::CronSweep => "cron_sweep",
            Self::RecoverStuckTasks => "recover_stuck_tasks",
            Self::PruneFinished => "prune_finished",
        }
    }
}

#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Enqueue a job for immediate execution.
    async fn dispatch(&self, job: Job) -> DomainResult<()>;

    /// Enqueue a job to run after `delay`.
    async fn dispatch_after(&self, job: Job, delay: Duration) -> DomainResult<()>;
}
