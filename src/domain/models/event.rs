//! Domain events consumed by the automation trigger path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Something that happened inside a tenant (a note was created, a decision
/// was made, a rule action emitted a follow-up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub collective_id: Option<Uuid>,
    pub event_type: String,
    #[serde(default)]
    pub subject_id: Option<Uuid>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(tenant_id: Uuid, event_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            collective_id: None,
            event_type: event_type.into(),
            subject_id: None,
            data: serde_json::Value::Null,
            occurred_at: Utc::now(),
        }
    }

    pub fn in_collective(mut self, collective_id: Uuid) -> Self {
        self.collective_id = Some(collective_id);
        self
    }

    pub fn with_subject(mut self, subject_id: Uuid) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Trigger data recorded on runs this event causes.
    pub fn trigger_data(&self) -> serde_json::Value {
        serde_json::json!({
            "event_id": self.id,
            "event_type": self.event_type,
            "subject_id": self.subject_id,
            "data": self.data,
            "occurred_at": self.occurred_at,
        })
    }
}
