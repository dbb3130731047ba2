//! Repository port for automation rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::AutomationRule;

#[async_trait]
pub trait AutomationRuleRepository: Send + Sync {
    /// Create a new rule.
    async fn create(&self, rule: &AutomationRule) -> DomainResult<()>;

    /// Get a rule by ID within a tenant.
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<Option<AutomationRule>>;

    /// Update an existing rule.
    async fn update(&self, rule: &AutomationRule) -> DomainResult<()>;

    /// Delete a rule.
    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<()>;

    /// List all rules of a tenant.
    async fn list(&self, tenant_id: Uuid) -> DomainResult<Vec<AutomationRule>>;

    /// Enabled event rules of a tenant listening for `event_type`.
    async fn list_enabled_for_event(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> DomainResult<Vec<AutomationRule>>;

    /// Enabled schedule rules across every tenant.
    async fn list_enabled_scheduled(&self) -> DomainResult<Vec<AutomationRule>>;

    /// Move the watermark to `now` unless it already lies at or after
    /// `minute_start`. Returns whether this caller claimed the minute.
    async fn claim_schedule_minute(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
        minute_start: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Stamp an execution on the rule.
    async fn record_execution(&self, tenant_id: Uuid, id: Uuid, now: DateTime<Utc>) -> DomainResult<()>;
}
