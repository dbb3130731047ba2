//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that adapters implement:
//! - Repositories for agent task runs, automation rules and rule runs
//! - JobDispatcher: the external job runtime
//! - Executors: the business actions run once context is established

pub mod agent_task_run_repository;
pub mod automation_rule_repository;
pub mod automation_rule_run_repository;
pub mod executors;
pub mod job_dispatcher;

pub use agent_task_run_repository::{AgentTaskRunRepository, ClaimOutcome, ClaimResult, StuckAgent};
pub use automation_rule_repository::AutomationRuleRepository;
pub use automation_rule_run_repository::AutomationRuleRunRepository;
pub use executors::{ActionOutcome, AgentTaskExecutor, AutomationActionExecutor};
pub use job_dispatcher::{Job, JobDispatcher, ScopeKind};
