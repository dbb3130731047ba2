//! Agent task run domain model.
//!
//! An `AgentTaskRun` is one queued unit of work for an autonomous agent
//! inside one tenant. Runs for the same `(tenant, agent)` pair execute
//! strictly one at a time, oldest first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an agent task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTaskStatus {
    /// Waiting for the agent to become free
    Queued,
    /// Claimed by a worker and executing
    Running,
    /// Finished and the action reported success
    Completed,
    /// The action failed, raised, or the run was declared stuck
    Failed,
}

impl Default for AgentTaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl AgentTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<AgentTaskStatus> {
        match self {
            Self::Queued => vec![Self::Running],
            Self::Running => vec![Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for AgentTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step the agent reported while acting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub name: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Structured result written back when a run finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub steps: Vec<TaskStep>,
}

impl TaskResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64, cost_usd: f64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_step(mut self, name: impl Into<String>, detail: Option<String>) -> Self {
        self.steps.push(TaskStep {
            name: name.into(),
            detail,
        });
        self
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Terminal status implied by this result.
    pub fn status(&self) -> AgentTaskStatus {
        if self.success {
            AgentTaskStatus::Completed
        } else {
            AgentTaskStatus::Failed
        }
    }
}

/// A persisted, tenant-scoped agent task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTaskRun {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub agent_id: Uuid,
    pub task_description: String,
    pub status: AgentTaskStatus,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AgentTaskRun {
    /// Create a new queued run.
    pub fn queued(tenant_id: Uuid, agent_id: Uuid, task_description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            agent_id,
            task_description: task_description.into(),
            status: AgentTaskStatus::Queued,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    /// Whether a running row has outlived the stuck timeout.
    pub fn is_stuck(&self, stuck_before: DateTime<Utc>) -> bool {
        self.status == AgentTaskStatus::Running
            && self.started_at.is_some_and(|started| started < stuck_before)
    }
}
