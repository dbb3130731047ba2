//! Domain errors for the background execution core.

use thiserror::Error;
use uuid::Uuid;

/// Programming errors in how a unit of work handles its execution context.
///
/// These are never retried: they mean a job was dispatched with the wrong
/// scope, or a tenant-scoped unit touched data before establishing a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Missing execution context: {field} is not set")]
    MissingContext { field: &'static str },

    #[error("Unexpected tenant context {tenant_id} in a system-scoped unit")]
    UnexpectedContext { tenant_id: Uuid },

    #[error("Invalid execution context: {0}")]
    InvalidContext(String),

    #[error("Execution context accessed outside of a guarded unit of work")]
    OutsideUnit,
}

impl ContextError {
    pub const fn missing_tenant() -> Self {
        Self::MissingContext { field: "tenant_id" }
    }

    pub const fn missing_collective() -> Self {
        Self::MissingContext { field: "collective_id" }
    }
}

/// Domain-level errors that can occur in the execution core.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Agent task run not found: {0}")]
    AgentTaskRunNotFound(Uuid),

    #[error("Automation rule not found: {0}")]
    AutomationRuleNotFound(Uuid),

    #[error("Automation rule run not found: {0}")]
    AutomationRuleRunNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Job dispatch failed: {0}")]
    DispatchFailed(String),

    #[error(transparent)]
    Context(#[from] ContextError),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Context errors are dispatch bugs, not runtime conditions.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Context(_))
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
