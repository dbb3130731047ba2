//! SQLite implementation of the AutomationRuleRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{
    format_datetime, parse_datetime, parse_json_or_default, parse_optional_datetime,
    parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AutomationRule, RuleTrigger};
use crate::domain::ports::AutomationRuleRepository;

#[derive(Clone)]
pub struct SqliteAutomationRuleRepository {
    pool: SqlitePool,
}

impl SqliteAutomationRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AutomationRuleRow {
    id: String,
    tenant_id: String,
    collective_id: Option<String>,
    name: String,
    trigger_type: String,
    trigger_config: String,
    actions: Option<String>,
    enabled: i32,
    last_executed_at: Option<String>,
    execution_count: i64,
    created_at: String,
    updated_at: String,
}

fn row_to_rule(row: AutomationRuleRow) -> DomainResult<AutomationRule> {
    let trigger: RuleTrigger = serde_json::from_str(&row.trigger_config)?;
    if trigger.as_str() != row.trigger_type {
        return Err(DomainError::SerializationError(format!(
            "Rule {} has trigger_type '{}' but a '{}' trigger config",
            row.id,
            row.trigger_type,
            trigger.as_str()
        )));
    }

    Ok(AutomationRule {
        id: parse_uuid(&row.id)?,
        tenant_id: parse_uuid(&row.tenant_id)?,
        collective_id: parse_optional_uuid(row.collective_id)?,
        name: row.name,
        trigger,
        actions: parse_json_or_default(row.actions)?,
        enabled: row.enabled != 0,
        last_executed_at: parse_optional_datetime(row.last_executed_at)?,
        execution_count: u64::try_from(row.execution_count).unwrap_or(0),
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[async_trait]
impl AutomationRuleRepository for SqliteAutomationRuleRepository {
    async fn create(&self, rule: &AutomationRule) -> DomainResult<()> {
        let trigger_config = serde_json::to_string(&rule.trigger)?;
        let actions = serde_json::to_string(&rule.actions)?;

        sqlx::query(
            r#"INSERT INTO automation_rules
               (id, tenant_id, collective_id, name, trigger_type, trigger_config, actions,
                enabled, last_executed_at, execution_count, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(rule.id.to_string())
        .bind(rule.tenant_id.to_string())
        .bind(rule.collective_id.map(|id| id.to_string()))
        .bind(&rule.name)
        .bind(rule.trigger.as_str())
        .bind(&trigger_config)
        .bind(&actions)
        .bind(i32::from(rule.enabled))
        .bind(rule.last_executed_at.map(format_datetime))
        .bind(i64::try_from(rule.execution_count).unwrap_or(i64::MAX))
        .bind(format_datetime(rule.created_at))
        .bind(format_datetime(rule.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<Option<AutomationRule>> {
        let row: Option<AutomationRuleRow> =
            sqlx::query_as("SELECT * FROM automation_rules WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id.to_string())
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_rule).transpose()
    }

    async fn update(&self, rule: &AutomationRule) -> DomainResult<()> {
        let trigger_config = serde_json::to_string(&rule.trigger)?;
        let actions = serde_json::to_string(&rule.actions)?;

        let result = sqlx::query(
            r#"UPDATE automation_rules SET
               collective_id = ?, name = ?, trigger_type = ?, trigger_config = ?,
               actions = ?, enabled = ?, updated_at = ?
               WHERE tenant_id = ? AND id = ?"#,
        )
        .bind(rule.collective_id.map(|id| id.to_string()))
        .bind(&rule.name)
        .bind(rule.trigger.as_str())
        .bind(&trigger_config)
        .bind(&actions)
        .bind(i32::from(rule.enabled))
        .bind(format_datetime(Utc::now()))
        .bind(rule.tenant_id.to_string())
        .bind(rule.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AutomationRuleNotFound(rule.id));
        }
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM automation_rules WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id.to_string())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AutomationRuleNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, tenant_id: Uuid) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<AutomationRuleRow> =
            sqlx::query_as("SELECT * FROM automation_rules WHERE tenant_id = ? ORDER BY created_at, rowid")
                .bind(tenant_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(row_to_rule).collect()
    }

    async fn list_enabled_for_event(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<AutomationRuleRow> = sqlx::query_as(
            r#"SELECT * FROM automation_rules
               WHERE tenant_id = ? AND enabled = 1 AND trigger_type = 'event'
                 AND json_extract(trigger_config, '$.event_type') = ?
               ORDER BY created_at, rowid"#,
        )
        .bind(tenant_id.to_string())
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_rule).collect()
    }

    async fn list_enabled_scheduled(&self) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<AutomationRuleRow> = sqlx::query_as(
            r#"SELECT * FROM automation_rules
               WHERE enabled = 1 AND trigger_type = 'schedule'
               ORDER BY tenant_id, created_at, rowid"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_rule).collect()
    }

    async fn claim_schedule_minute(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
        minute_start: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let now_str = format_datetime(now);
        let result = sqlx::query(
            r#"UPDATE automation_rules
               SET last_executed_at = ?, execution_count = execution_count + 1, updated_at = ?
               WHERE tenant_id = ? AND id = ? AND enabled = 1
                 AND (last_executed_at IS NULL OR last_executed_at < ?)"#,
        )
        .bind(&now_str)
        .bind(&now_str)
        .bind(tenant_id.to_string())
        .bind(id.to_string())
        .bind(format_datetime(minute_start))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_execution(&self, tenant_id: Uuid, id: Uuid, now: DateTime<Utc>) -> DomainResult<()> {
        // Schedule rules already moved their watermark when they claimed the
        // minute; moving it again here could swallow the next minute.
        let now_str = format_datetime(now);
        sqlx::query(
            r#"UPDATE automation_rules
               SET last_executed_at = ?, execution_count = execution_count + 1, updated_at = ?
               WHERE tenant_id = ? AND id = ? AND trigger_type = 'event'"#,
        )
        .bind(&now_str)
        .bind(&now_str)
        .bind(tenant_id.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
