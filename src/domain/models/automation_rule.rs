//! Automation rule domain model.
//!
//! A rule is triggered either by a domain event of a given type or by a
//! cron schedule evaluated in the rule's timezone. What its actions do is
//! decided by the action executor; this model only carries them.

use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// What makes a rule fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleTrigger {
    /// Fire when an event of this type occurs in the rule's tenant.
    Event { event_type: String },
    /// Fire on every minute matching the cron expression in `timezone`.
    Schedule {
        cron: String,
        #[serde(default = "default_timezone")]
        timezone: String,
    },
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl RuleTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event { .. } => "event",
            Self::Schedule { .. } => "schedule",
        }
    }

    pub fn is_schedule(&self) -> bool {
        matches!(self, Self::Schedule { .. })
    }
}

/// One configured action. Interpreted by the action executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    pub action_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl RuleAction {
    pub fn new(action_type: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            action_type: action_type.into(),
            config,
        }
    }
}

/// A persisted, tenant-scoped automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Rules bound to a collective only see that collective's events.
    pub collective_id: Option<Uuid>,
    pub name: String,
    pub trigger: RuleTrigger,
    pub actions: Vec<RuleAction>,
    pub enabled: bool,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationRule {
    pub fn new(tenant_id: Uuid, name: impl Into<String>, trigger: RuleTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            collective_id: None,
            name: name.into(),
            trigger,
            actions: Vec::new(),
            enabled: true,
            last_executed_at: None,
            execution_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn on_event(tenant_id: Uuid, name: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self::new(
            tenant_id,
            name,
            RuleTrigger::Event {
                event_type: event_type.into(),
            },
        )
    }

    pub fn on_schedule(
        tenant_id: Uuid,
        name: impl Into<String>,
        cron: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Self {
        Self::new(
            tenant_id,
            name,
            RuleTrigger::Schedule {
                cron: cron.into(),
                timezone: timezone.into(),
            },
        )
    }

    pub fn in_collective(mut self, collective_id: Uuid) -> Self {
        self.collective_id = Some(collective_id);
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_last_executed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_executed_at = Some(at);
        self
    }

    /// Parse this rule's schedule, if it is schedule-triggered.
    pub fn schedule(&self) -> Option<DomainResult<CronSchedule>> {
        match &self.trigger {
            RuleTrigger::Schedule { cron, timezone } => Some(CronSchedule::parse(cron, timezone)),
            RuleTrigger::Event { .. } => None,
        }
    }

    /// Whether the watermark already covers the minute starting at `minute_start`.
    pub fn fired_in_minute(&self, minute_start: DateTime<Utc>) -> bool {
        self.last_executed_at
            .is_some_and(|last| last >= minute_start && last < minute_start + Duration::minutes(1))
    }
}

/// Truncate a timestamp to the start of its minute.
pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// A parsed cron expression bound to a timezone.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
    timezone: Tz,
}

impl CronSchedule {
    /// Parse a cron expression and an IANA timezone name.
    ///
    /// Five-field expressions (`min hour dom month dow`) get an implied
    /// seconds field of `0`; numeric days of week use the crontab numbering
    /// (0 or 7 = Sunday).
    pub fn parse(expression: &str, timezone: &str) -> DomainResult<Self> {
        let normalized = normalize_expression(expression);
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| DomainError::InvalidSchedule {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;
        let timezone = Tz::from_str(timezone).map_err(|e| DomainError::InvalidSchedule {
            expression: expression.to_string(),
            reason: format!("unknown timezone '{}': {}", timezone, e),
        })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Whether the minute containing `at` is a scheduled minute.
    pub fn matches_minute(&self, at: DateTime<Utc>) -> bool {
        let minute = self.timezone.from_utc_datetime(&truncate_to_minute(at).naive_utc());
        let probe = minute.clone() - Duration::seconds(1);
        self.schedule.after(&probe).next().is_some_and(|next| next == minute)
    }

    /// Next scheduled instant strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = self.timezone.from_utc_datetime(&after.naive_utc());
        self.schedule
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

fn normalize_expression(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return fields.join(" ");
    }
    let day_of_week = crontab_day_of_week(fields[4]);
    format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    )
}

/// Translate crontab day-of-week numbers (0-7, Sunday = 0 or 7) into the
/// `cron` crate's numbering (1-7, Sunday = 1). Names pass through.
fn crontab_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|item| {
            let (base, step) = match item.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (item, None),
            };
            if let Some(days) = step.and_then(|step| expand_stepped_days(base, step)) {
                return days;
            }
            let translated = match base.split_once('-') {
                Some((start, end)) => match (start.parse::<u8>(), end.parse::<u8>()) {
                    (Ok(start), Ok(7)) if step.is_none() && start > 0 => {
                        format!("{}-7,1", start + 1)
                    }
                    (Ok(start), Ok(end)) => format!("{}-{}", start % 7 + 1, (end + 1).min(7)),
                    _ => base.to_string(),
                },
                None => match base.parse::<u8>() {
                    Ok(day) => (day % 7 + 1).to_string(),
                    Err(_) => base.to_string(),
                },
            };
            match step {
                Some(step) => format!("{}/{}", translated, step),
                None => translated,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Expand a stepped numeric item (`1-7/2`, `0/3`) into an explicit day list.
/// Sunday sits at both ends of the crontab range, so a shifted range with a
/// step cannot be expressed in the `cron` numbering.
fn expand_stepped_days(base: &str, step: &str) -> Option<String> {
    let step = step.parse::<usize>().ok().filter(|step| *step > 0)?;
    let (start, end) = match base.split_once('-') {
        Some((start, end)) => (start.parse::<u8>().ok()?, end.parse::<u8>().ok()?),
        None => (base.parse::<u8>().ok()?, 7),
    };
    if start > end || end > 7 {
        return None;
    }

    let mut days: Vec<u8> = (start..=end).step_by(step).map(|day| day % 7 + 1).collect();
    days.sort_unstable();
    days.dedup();
    Some(days.iter().map(u8::to_string).collect::<Vec<_>>().join(","))
}
