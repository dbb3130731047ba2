//! Seams to the business actions invoked once context is established.

use async_trait::async_trait;

use crate::domain::models::{AgentTaskRun, AutomationRule, AutomationRuleRun, DomainEvent, TaskResult};

/// Performs an agent task. Errors are recorded on the run as failures.
#[async_trait]
pub trait AgentTaskExecutor: Send + Sync {
    async fn execute(&self, run: &AgentTaskRun) -> anyhow::Result<TaskResult>;
}

/// What a rule's actions produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    /// Follow-up events; they may trigger further rules in the same chain.
    pub emitted_events: Vec<DomainEvent>,
    pub summary: Option<String>,
}

impl ActionOutcome {
    pub fn with_event(mut self, event: DomainEvent) -> Self {
        self.emitted_events.push(event);
        self
    }
}

/// Performs a rule's actions. Errors are recorded on the run as failures.
#[async_trait]
pub trait AutomationActionExecutor: Send + Sync {
    async fn execute(&self, rule: &AutomationRule, run: &AutomationRuleRun) -> anyhow::Result<ActionOutcome>;
}
