//! Repository port for agent task runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentTaskRun, AgentTaskStatus, TaskResult};

/// What a claim attempt found for one `(tenant, agent)` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimResult {
    /// The oldest queued run, now `running`.
    Claimed(AgentTaskRun),
    /// Another run is still in flight; it re-arms the queue when it finishes.
    Busy,
    /// Nothing queued.
    Empty,
}

/// Outcome of [`AgentTaskRunRepository::claim_next`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimOutcome {
    /// Runs force-failed by stuck-task recovery before claiming.
    pub recovered: Vec<Uuid>,
    pub result: ClaimResult,
}

/// A `(tenant, agent)` pair with at least one stuck running row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StuckAgent {
    pub tenant_id: Uuid,
    pub agent_id: Uuid,
}

#[async_trait]
pub trait AgentTaskRunRepository: Send + Sync {
    /// Persist a new run.
    async fn insert(&self, run: &AgentTaskRun) -> DomainResult<()>;

    /// Get a run by ID within a tenant.
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<Option<AgentTaskRun>>;

    /// List an agent's runs in creation order, optionally by status.
    async fn list_for_agent(
        &self,
        tenant_id: Uuid,
        agent_id: Uuid,
        status: Option<AgentTaskStatus>,
    ) -> DomainResult<Vec<AgentTaskRun>>;

    /// Recover stuck runs, then claim the oldest queued run unless one is
    /// still running. All three steps happen atomically for the pair.
    async fn claim_next(
        &self,
        tenant_id: Uuid,
        agent_id: Uuid,
        now: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
    ) -> DomainResult<ClaimOutcome>;

    /// Write the terminal status and result of a running run.
    ///
    /// Returns `false` if the run was no longer `running` (for example it
    /// was declared stuck meanwhile); the row is then left untouched.
    async fn finish(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        result: &TaskResult,
        now: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Cross-tenant scan for pairs with running rows started before `stuck_before`.
    async fn find_stuck(&self, stuck_before: DateTime<Utc>) -> DomainResult<Vec<StuckAgent>>;

    /// Cross-tenant retention sweep of terminal runs finished before `cutoff`.
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}
