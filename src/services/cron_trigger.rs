//! Periodic evaluator for schedule-triggered automation rules.
//!
//! A sweep is a system-scoped unit: it scans enabled schedule rules across
//! every tenant, and for each rule whose cron expression matches the
//! current minute in the rule's timezone it claims that minute through the
//! `last_executed_at` watermark before creating a pending run under the
//! rule's tenant.
//!
//! The watermark claim is a conditional update, so two sweeps racing on
//! the same minute fire the rule once. One bad rule (unparseable schedule,
//! unknown timezone, storage error) is logged and skipped; it never aborts
//! the sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{truncate_to_minute, AutomationChain, AutomationRule, TriggerSource};
use crate::domain::ports::AutomationRuleRepository;

use super::automation_trigger::AutomationTrigger;
use super::scope::SystemScope;

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CronSweepReport {
    pub evaluated: usize,
    /// Runs created, one per fired rule.
    pub fired: Vec<Uuid>,
    /// Rules due this minute whose watermark already covered it.
    pub already_fired: usize,
    pub invalid: usize,
    pub errors: usize,
}

pub struct CronTrigger {
    rules: Arc<dyn AutomationRuleRepository>,
    trigger: Arc<AutomationTrigger>,
}

impl CronTrigger {
    pub fn new(rules: Arc<dyn AutomationRuleRepository>, trigger: Arc<AutomationTrigger>) -> Self {
        Self { rules, trigger }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> DomainResult<CronSweepReport> {
        SystemScope::verify_no_tenant_context()?;
        let minute = truncate_to_minute(now);
        let rules = self.rules.list_enabled_scheduled().await?;

        let mut report = CronSweepReport::default();
        for rule in rules {
            report.evaluated += 1;
            match self.evaluate(&rule, now, minute).await {
                Ok(Evaluation::Fired(run_id)) => report.fired.push(run_id),
                Ok(Evaluation::AlreadyFired) => report.already_fired += 1,
                Ok(Evaluation::NotDue) => {}
                Ok(Evaluation::Invalid) => report.invalid += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(rule_id = %rule.id, tenant_id = %rule.tenant_id, error = %err, "scheduled rule failed to fire");
                    report.errors += 1;
                }
            }
        }

        info!(
            %minute,
            evaluated = report.evaluated,
            fired = report.fired.len(),
            invalid = report.invalid,
            "cron sweep finished"
        );
        Ok(report)
    }

    async fn evaluate(
        &self,
        rule: &AutomationRule,
        now: DateTime<Utc>,
        minute: DateTime<Utc>,
    ) -> DomainResult<Evaluation> {
        let schedule = match rule.schedule() {
            Some(Ok(schedule)) => schedule,
            Some(Err(err)) => {
                warn!(rule_id = %rule.id, tenant_id = %rule.tenant_id, error = %err, "skipping rule with invalid schedule");
                return Ok(Evaluation::Invalid);
            }
            None => return Ok(Evaluation::NotDue),
        };

        if !schedule.matches_minute(minute) {
            return Ok(Evaluation::NotDue);
        }
        if rule.fired_in_minute(minute) {
            debug!(rule_id = %rule.id, %minute, "watermark already covers this minute");
            return Ok(Evaluation::AlreadyFired);
        }

        // Claim the minute before creating anything.
        let claimed = self
            .rules
            .claim_schedule_minute(rule.tenant_id, rule.id, now, minute)
            .await?;
        if !claimed {
            debug!(rule_id = %rule.id, %minute, "minute claimed by a concurrent sweep");
            return Ok(Evaluation::AlreadyFired);
        }

        let trigger_data = serde_json::json!({
            "scheduled_for": minute,
            "cron": schedule.expression(),
            "timezone": schedule.timezone().name(),
        });
        let fire = || async {
            self.trigger
                .trigger_rule(rule, TriggerSource::Schedule, trigger_data, AutomationChain::new())
                .await
        };
        let run = match rule.collective_id {
            Some(collective_id) => {
                SystemScope::with_tenant_and_collective(rule.tenant_id, collective_id, fire).await??
            }
            None => SystemScope::with_tenant(rule.tenant_id, fire).await??,
        };

        info!(rule_id = %rule.id, run_id = %run.id, %minute, "scheduled rule fired");
        Ok(Evaluation::Fired(run.id))
    }
}

enum Evaluation {
    Fired(Uuid),
    AlreadyFired,
    NotDue,
    Invalid,
}
