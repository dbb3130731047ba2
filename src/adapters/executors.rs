//! Default business-action executors wired by the worker binary.
//!
//! The real actions (what an agent does, what an automation action does)
//! live outside this crate. These implementations log what they were asked
//! to do and report success, which keeps a standalone worker observable
//! end to end.

use async_trait::async_trait;
use tracing::info;

use crate::domain::models::{AgentTaskRun, AutomationRule, AutomationRuleRun, TaskResult};
use crate::domain::ports::{ActionOutcome, AgentTaskExecutor, AutomationActionExecutor};
use crate::services::ExecutionContext;

#[derive(Debug, Clone, Default)]
pub struct LoggingAgentTaskExecutor;

#[async_trait]
impl AgentTaskExecutor for LoggingAgentTaskExecutor {
    async fn execute(&self, run: &AgentTaskRun) -> anyhow::Result<TaskResult> {
        let context = ExecutionContext::current();
        info!(
            run_id = %run.id,
            agent_id = %run.agent_id,
            tenant_id = ?context.tenant_id,
            task = %run.task_description,
            "agent task received"
        );
        Ok(TaskResult::succeeded(format!("acknowledged: {}", run.task_description))
            .with_step("acknowledge", None))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingActionExecutor;

#[async_trait]
impl AutomationActionExecutor for LoggingActionExecutor {
    async fn execute(&self, rule: &AutomationRule, run: &AutomationRuleRun) -> anyhow::Result<ActionOutcome> {
        for action in &rule.actions {
            info!(
                run_id = %run.id,
                rule_id = %rule.id,
                action = %action.action_type,
                depth = run.chain.depth,
                "automation action received"
            );
        }
        Ok(ActionOutcome {
            emitted_events: Vec::new(),
            summary: Some(format!("{} action(s) acknowledged", rule.actions.len())),
        })
    }
}
