//! Turns trigger decisions into pending automation rule runs.
//!
//! Consumes the output of event dispatch (an event plus the chain it
//! arrived with) and schedule firing (a rule that is due). Every accepted
//! rule becomes a `pending` run carrying its inbound chain in the trigger
//! payload, and its execution is dispatched as a separate unit.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::{ContextError, DomainError, DomainResult};
use crate::domain::models::{
    AutomationChain, AutomationRule, AutomationRuleRun, ChainLimits, DomainEvent, TriggerSource,
};
use crate::domain::ports::{AutomationRuleRepository, AutomationRuleRunRepository, Job, JobDispatcher};

use super::scope::TenantScope;

pub struct AutomationTrigger {
    rules: Arc<dyn AutomationRuleRepository>,
    runs: Arc<dyn AutomationRuleRunRepository>,
    dispatcher: Arc<dyn JobDispatcher>,
    limits: ChainLimits,
}

impl AutomationTrigger {
    pub fn new(
        rules: Arc<dyn AutomationRuleRepository>,
        runs: Arc<dyn AutomationRuleRunRepository>,
        dispatcher: Arc<dyn JobDispatcher>,
        limits: ChainLimits,
    ) -> Self {
        Self {
            rules,
            runs,
            dispatcher,
            limits,
        }
    }

    pub const fn limits(&self) -> ChainLimits {
        self.limits
    }

    /// Create runs for every enabled rule listening to `event`.
    ///
    /// `inbound` is the chain of the run whose action emitted the event;
    /// `None` makes the event the origin of a new cascade. Rules the chain
    /// denies are skipped without error.
    pub async fn dispatch_event(
        &self,
        event: &DomainEvent,
        inbound: Option<&AutomationChain>,
    ) -> DomainResult<Vec<AutomationRuleRun>> {
        let tenant_id = require_tenant_of(event.tenant_id)?;

        let rules: Vec<AutomationRule> = self
            .rules
            .list_enabled_for_event(tenant_id, &event.event_type)
            .await?
            .into_iter()
            .filter(|rule| rule.collective_id.is_none() || rule.collective_id == event.collective_id)
            .collect();
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let parent = inbound.cloned().unwrap_or_default();
        let rule_ids: Vec<Uuid> = rules.iter().map(|rule| rule.id).collect();
        let plan = parent.fan_out(&rule_ids, &self.limits);

        for (rule_id, denial) in &plan.denied {
            debug!(%rule_id, event_id = %event.id, %denial, "automation chain denied rule");
        }

        let mut created = Vec::with_capacity(plan.accepted.len());
        for (rule_id, chain) in plan.accepted {
            let Some(rule) = rules.iter().find(|rule| rule.id == rule_id) else {
                continue;
            };
            let run = AutomationRuleRun::pending(tenant_id, rule.id, TriggerSource::Event, event.trigger_data())
                .in_collective(rule.collective_id.or(event.collective_id))
                .with_event(event.id)
                .with_chain(chain);
            self.enqueue(&run).await?;
            created.push(run);
        }

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            triggered = created.len(),
            denied = plan.denied.len(),
            "event dispatched to automation rules"
        );
        Ok(created)
    }

    /// Create a pending run for one rule and dispatch its execution.
    pub async fn trigger_rule(
        &self,
        rule: &AutomationRule,
        source: TriggerSource,
        trigger_data: serde_json::Value,
        chain: AutomationChain,
    ) -> DomainResult<AutomationRuleRun> {
        let tenant_id = require_tenant_of(rule.tenant_id)?;
        if !rule.enabled {
            return Err(DomainError::ValidationFailed(format!(
                "automation rule {} is disabled",
                rule.id
            )));
        }

        let run = AutomationRuleRun::pending(tenant_id, rule.id, source, trigger_data)
            .in_collective(rule.collective_id)
            .with_chain(chain);
        self.enqueue(&run).await?;
        debug!(run_id = %run.id, rule_id = %rule.id, source = source.as_str(), "automation rule triggered");
        Ok(run)
    }

    async fn enqueue(&self, run: &AutomationRuleRun) -> DomainResult<()> {
        self.runs.create(run).await?;
        self.dispatcher
            .dispatch(Job::ExecuteAutomationRun {
                tenant_id: run.tenant_id,
                collective_id: run.collective_id,
                run_id: run.id,
            })
            .await
    }
}

/// The established tenant, which must own the record being acted on.
fn require_tenant_of(owner: Uuid) -> DomainResult<Uuid> {
    let tenant_id = TenantScope::require_tenant()?;
    if tenant_id != owner {
        return Err(ContextError::InvalidContext(format!(
            "record of tenant {} handled under tenant {}",
            owner, tenant_id
        ))
        .into());
    }
    Ok(tenant_id)
}
