//! Automation rule run domain model.
//!
//! A run is created `pending` by whatever decided to trigger a rule (event
//! dispatch or the cron trigger) and is consumed by the run executor as a
//! separate asynchronous unit. Failures are recorded on the row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::automation_chain::AutomationChain;

/// Status of a rule run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// The chain denied execution (loop, depth, or breadth cap).
    Skipped,
}

impl Default for RuleRunStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl RuleRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        match self {
            Self::Pending => matches!(new_status, Self::Running | Self::Failed | Self::Skipped),
            Self::Running => matches!(new_status, Self::Completed | Self::Failed | Self::Skipped),
            Self::Completed | Self::Failed | Self::Skipped => false,
        }
    }
}

impl std::fmt::Display for RuleRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a rule run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Event,
    Schedule,
    Manual,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Schedule => "schedule",
            Self::Manual => "manual",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "event" => Some(Self::Event),
            "schedule" => Some(Self::Schedule),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A persisted, tenant-scoped rule run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRuleRun {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub collective_id: Option<Uuid>,
    pub automation_rule_id: Uuid,
    pub trigger_source: TriggerSource,
    pub trigger_event_id: Option<Uuid>,
    pub trigger_data: serde_json::Value,
    /// Inbound chain while pending; the recorded chain once running.
    pub chain: AutomationChain,
    pub status: RuleRunStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationRuleRun {
    pub fn pending(
        tenant_id: Uuid,
        automation_rule_id: Uuid,
        trigger_source: TriggerSource,
        trigger_data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            collective_id: None,
            automation_rule_id,
            trigger_source,
            trigger_event_id: None,
            trigger_data,
            chain: AutomationChain::new(),
            status: RuleRunStatus::Pending,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn in_collective(mut self, collective_id: Option<Uuid>) -> Self {
        self.collective_id = collective_id;
        self
    }

    pub fn with_event(mut self, event_id: Uuid) -> Self {
        self.trigger_event_id = Some(event_id);
        self
    }

    /// Carry `chain` both on the run and inside its trigger payload.
    pub fn with_chain(mut self, chain: AutomationChain) -> Self {
        chain.attach_to(&mut self.trigger_data);
        self.chain = chain;
        self
    }
}
