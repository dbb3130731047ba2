//! Collective worker - multi-tenant background execution core
//!
//! Runs per-agent serialized task queues, bounded cascades of automation
//! rules, and cron-triggered rules for many tenants from one job runtime.
//! Every job executes inside its own execution context, so tenant identity
//! never leaks from one unit of work into the next.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors, and port traits
//! - **Service Layer** (`services`): execution context, scopes, scheduler, automation
//! - **Application Layer** (`application`): job runner and worker pool
//! - **Adapters** (`adapters`): SQLite repositories, job dispatchers, default executors
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): operator commands
//!
//! # Example
//!
//! ```ignore
//! use collective_worker::services::{ContextGuard, TenantScope};
//!
//! async fn handle(tenant_id: uuid::Uuid) -> anyhow::Result<()> {
//!     ContextGuard::run(async move {
//!         TenantScope::establish_tenant(tenant_id)?;
//!         // tenant-scoped work
//!         Ok(())
//!     })
//!     .await
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{JobRunner, Worker};
pub use domain::errors::{ContextError, DomainError, DomainResult};
pub use domain::models::{
    AgentTaskRun, AgentTaskStatus, AutomationChain, AutomationRule, AutomationRuleRun, Config,
    DomainEvent, RuleRunStatus,
};
pub use domain::ports::{Job, JobDispatcher};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AgentTaskScheduler, AutomationRunExecutor, AutomationTrigger, ContextGuard, CronTrigger,
    ExecutionContext, SystemScope, TenantScope,
};
