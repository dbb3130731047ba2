//! Executes one pending automation rule run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AutomationChain, AutomationRuleRun, ChainDenial, RuleRunStatus};
use crate::domain::ports::{AutomationActionExecutor, AutomationRuleRepository, AutomationRuleRunRepository};

use super::agent_task_scheduler::panic_message;
use super::automation_trigger::AutomationTrigger;
use super::execution_context::ExecutionContext;
use super::scope::{SystemScope, TenantScope};

/// How a rule run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { follow_up_runs: usize },
    Failed { error: String },
    /// The chain or the rule's state did not allow execution.
    Skipped { reason: String },
    /// The run was not pending, typically a redelivered job.
    AlreadyHandled { status: RuleRunStatus },
}

pub struct AutomationRunExecutor {
    rules: Arc<dyn AutomationRuleRepository>,
    runs: Arc<dyn AutomationRuleRunRepository>,
    actions: Arc<dyn AutomationActionExecutor>,
    trigger: Arc<AutomationTrigger>,
}

impl AutomationRunExecutor {
    pub fn new(
        rules: Arc<dyn AutomationRuleRepository>,
        runs: Arc<dyn AutomationRuleRunRepository>,
        actions: Arc<dyn AutomationActionExecutor>,
        trigger: Arc<AutomationTrigger>,
    ) -> Self {
        Self {
            rules,
            runs,
            actions,
            trigger,
        }
    }

    /// Move a pending run to running, re-check its chain, and run the
    /// rule's actions. Events the actions emit are dispatched with the
    /// updated chain.
    pub async fn execute(&self, run_id: Uuid) -> DomainResult<RunOutcome> {
        let tenant_id = TenantScope::require_tenant()?;
        let run = self
            .runs
            .get(tenant_id, run_id)
            .await?
            .ok_or(DomainError::AutomationRuleRunNotFound(run_id))?;

        if run.status != RuleRunStatus::Pending {
            debug!(%run_id, status = %run.status, "automation run already handled");
            return Ok(RunOutcome::AlreadyHandled { status: run.status });
        }
        if !self.transition(&run, RuleRunStatus::Pending, RuleRunStatus::Running, None).await? {
            let status = self
                .runs
                .get(tenant_id, run_id)
                .await?
                .map_or(RuleRunStatus::Running, |current| current.status);
            return Ok(RunOutcome::AlreadyHandled { status });
        }

        ExecutionContext::set_automation_run(Some(run.id))?;
        let outcome = self.execute_running(&run).await;
        ExecutionContext::set_automation_run(None)?;

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(err) => self.fail_on_error(&run, err).await,
        }
    }

    /// A run that errored after it was claimed must not stay `running`.
    /// Record the failure; the error still propagates when it is fatal or
    /// the failure could not be recorded.
    async fn fail_on_error(&self, run: &AutomationRuleRun, err: DomainError) -> DomainResult<RunOutcome> {
        let error = err.to_string();
        match self
            .transition(run, RuleRunStatus::Running, RuleRunStatus::Failed, Some(&error))
            .await
        {
            Ok(true) => {
                warn!(run_id = %run.id, rule_id = %run.automation_rule_id, %error, "automation run failed");
                if err.is_fatal() {
                    Err(err)
                } else {
                    Ok(RunOutcome::Failed { error })
                }
            }
            Ok(false) => Err(err),
            Err(record_err) => {
                warn!(run_id = %run.id, error = %record_err, "failed to record automation run failure");
                Err(err)
            }
        }
    }

    async fn execute_running(&self, run: &AutomationRuleRun) -> DomainResult<RunOutcome> {
        let mut run = run.clone();
        let tenant_id = run.tenant_id;

        let mut chain = match AutomationChain::restore_from(&run.trigger_data) {
            Ok(chain) => chain,
            Err(err) => return self.fail(&run, err.to_string()).await,
        };

        let Some(rule) = self.rules.get(tenant_id, run.automation_rule_id).await? else {
            return self.fail(&run, format!("automation rule {} no longer exists", run.automation_rule_id)).await;
        };
        if !rule.enabled {
            return self.skip(&run, format!("automation rule {} is disabled", rule.id)).await;
        }
        if let Err(denial) = chain.check(rule.id, &self.trigger.limits()) {
            debug!(run_id = %run.id, rule_id = %rule.id, %denial, "automation chain denied run");
            return self.skip(&run, denial.to_string()).await;
        }

        chain.record_execution(rule.id, run.trigger_event_id);
        // Branches of one cascade only see their own path; the claim ledger
        // catches a rule reached again along a converging branch.
        let cascade_id = chain.root_at(run.id);
        if !self
            .runs
            .claim_in_cascade(tenant_id, cascade_id, rule.id, run.id, Utc::now())
            .await?
        {
            let denial = ChainDenial::LoopDetected { rule_id: rule.id };
            debug!(run_id = %run.id, rule_id = %rule.id, %cascade_id, %denial, "rule already ran in this cascade");
            return self.skip(&run, denial.to_string()).await;
        }
        self.runs.save_chain(tenant_id, run.id, &chain).await?;
        run.chain = chain.clone();
        self.rules.record_execution(tenant_id, rule.id, Utc::now()).await?;

        if let Some(collective_id) = run.collective_id {
            TenantScope::establish_collective(collective_id)?;
        }

        let result = AssertUnwindSafe(self.actions.execute(&rule, &run)).catch_unwind().await;
        let action_outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => return self.fail(&run, format!("{:#}", err)).await,
            Err(panic) => {
                return self
                    .fail(&run, format!("action executor panicked: {}", panic_message(&*panic)))
                    .await
            }
        };

        self.transition(&run, RuleRunStatus::Running, RuleRunStatus::Completed, None).await?;

        // Later events of the same run see the rules earlier events claimed.
        let mut outbound = chain.clone();
        let mut follow_up_runs = 0;
        for event in &action_outcome.emitted_events {
            match self.trigger.dispatch_event(event, Some(&outbound)).await {
                Ok(created) => {
                    follow_up_runs += created.len();
                    outbound.extend_claimed(created.iter().map(|run| run.automation_rule_id));
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(run_id = %run.id, event_id = %event.id, error = %err, "failed to dispatch follow-up event");
                }
            }
        }

        info!(
            run_id = %run.id,
            rule_id = %rule.id,
            source = run.trigger_source.as_str(),
            depth = chain.depth,
            follow_up_runs,
            "automation run completed"
        );
        Ok(RunOutcome::Completed { follow_up_runs })
    }

    /// Delete cascade claims older than `retention_days`.
    pub async fn prune_cascade_claims(&self, now: DateTime<Utc>, retention_days: u32) -> DomainResult<u64> {
        SystemScope::verify_no_tenant_context()?;
        let cutoff = now - Duration::days(i64::from(retention_days));
        let deleted = self.runs.delete_cascade_claims_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, %cutoff, "pruned automation cascade claims");
        }
        Ok(deleted)
    }

    async fn fail(&self, run: &AutomationRuleRun, error: String) -> DomainResult<RunOutcome> {
        warn!(run_id = %run.id, rule_id = %run.automation_rule_id, %error, "automation run failed");
        self.transition(run, RuleRunStatus::Running, RuleRunStatus::Failed, Some(&error))
            .await?;
        Ok(RunOutcome::Failed { error })
    }

    async fn skip(&self, run: &AutomationRuleRun, reason: String) -> DomainResult<RunOutcome> {
        self.transition(run, RuleRunStatus::Running, RuleRunStatus::Skipped, Some(&reason))
            .await?;
        Ok(RunOutcome::Skipped { reason })
    }

    async fn transition(
        &self,
        run: &AutomationRuleRun,
        from: RuleRunStatus,
        to: RuleRunStatus,
        error: Option<&str>,
    ) -> DomainResult<bool> {
        self.runs
            .transition(run.tenant_id, run.id, from, to, error, Utc::now())
            .await
    }
}
