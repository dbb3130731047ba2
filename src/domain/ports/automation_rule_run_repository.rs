//! Repository port for automation rule runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AutomationChain, AutomationRuleRun, RuleRunStatus};

#[async_trait]
pub trait AutomationRuleRunRepository: Send + Sync {
    /// Persist a new run.
    async fn create(&self, run: &AutomationRuleRun) -> DomainResult<()>;

    /// Get a run by ID within a tenant.
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<Option<AutomationRuleRun>>;

    /// Runs of one rule, oldest first.
    async fn list_for_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> DomainResult<Vec<AutomationRuleRun>>;

    /// Runs of a tenant in a given status, oldest first.
    async fn list_by_status(
        &self,
        tenant_id: Uuid,
        status: RuleRunStatus,
    ) -> DomainResult<Vec<AutomationRuleRun>>;

    /// Compare-and-set the status. Returns `false` if the run was not in `from`.
    async fn transition(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        from: RuleRunStatus,
        to: RuleRunStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Persist the chain recorded for a run.
    async fn save_chain(&self, tenant_id: Uuid, id: Uuid, chain: &AutomationChain) -> DomainResult<()>;

    /// Claim `rule_id` for `run_id` within a cascade. Returns `false` when a
    /// different run already claimed the rule in that cascade; claiming again
    /// with the same run succeeds.
    async fn claim_in_cascade(
        &self,
        tenant_id: Uuid,
        cascade_id: Uuid,
        rule_id: Uuid,
        run_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Delete cascade claims taken before `cutoff`, across all tenants.
    async fn delete_cascade_claims_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}
