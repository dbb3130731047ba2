pub mod agent_task_run;
pub mod automation_chain;
pub mod automation_rule;
pub mod automation_rule_run;
pub mod config;
pub mod event;

pub use agent_task_run::{AgentTaskRun, AgentTaskStatus, TaskResult, TaskStep};
pub use automation_chain::{
    AutomationChain, ChainDenial, ChainLimits, FanOut, CHAIN_PAYLOAD_KEY, MAX_CHAIN_DEPTH,
    MAX_RULES_PER_CHAIN,
};
pub use automation_rule::{truncate_to_minute, AutomationRule, CronSchedule, RuleAction, RuleTrigger};
pub use automation_rule_run::{AutomationRuleRun, RuleRunStatus, TriggerSource};
pub use config::{
    AutomationConfig, Config, DatabaseConfig, LoggingConfig, SchedulerConfig, WorkerConfig,
};
pub use event::DomainEvent;
