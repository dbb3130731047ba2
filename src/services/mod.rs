//! Core services of the background execution core.

pub mod agent_task_scheduler;
pub mod automation_executor;
pub mod automation_trigger;
pub mod context_guard;
pub mod cron_trigger;
pub mod execution_context;
pub mod scope;

pub use agent_task_scheduler::{AgentTaskScheduler, Continuation, RecoveryReport};
pub use automation_executor::{AutomationRunExecutor, RunOutcome};
pub use automation_trigger::AutomationTrigger;
pub use context_guard::ContextGuard;
pub use cron_trigger::{CronSweepReport, CronTrigger};
pub use execution_context::{ContextSnapshot, ExecutionContext};
pub use scope::{SystemScope, TenantScope};
