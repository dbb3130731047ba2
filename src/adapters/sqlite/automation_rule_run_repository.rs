//! SQLite implementation of the AutomationRuleRunRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{
    format_datetime, parse_datetime, parse_json_or_default, parse_optional_datetime,
    parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AutomationChain, AutomationRuleRun, RuleRunStatus, TriggerSource};
use crate::domain::ports::AutomationRuleRunRepository;

#[derive(Clone)]
pub struct SqliteAutomationRuleRunRepository {
    pool: SqlitePool,
}

impl SqliteAutomationRuleRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AutomationRuleRunRow {
    id: String,
    tenant_id: String,
    collective_id: Option<String>,
    automation_rule_id: String,
    trigger_source: String,
    trigger_event_id: Option<String>,
    trigger_data: String,
    chain: Option<String>,
    status: String,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    updated_at: String,
}

impl TryFrom<AutomationRuleRunRow> for AutomationRuleRun {
    type Error = DomainError;

    fn try_from(row: AutomationRuleRunRow) -> Result<Self, Self::Error> {
        let status = RuleRunStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid rule run status: {}", row.status))
        })?;
        let trigger_source = TriggerSource::from_str(&row.trigger_source).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid trigger source: {}", row.trigger_source))
        })?;
        let chain: AutomationChain = parse_json_or_default(row.chain)?;

        Ok(AutomationRuleRun {
            id: parse_uuid(&row.id)?,
            tenant_id: parse_uuid(&row.tenant_id)?,
            collective_id: parse_optional_uuid(row.collective_id)?,
            automation_rule_id: parse_uuid(&row.automation_rule_id)?,
            trigger_source,
            trigger_event_id: parse_optional_uuid(row.trigger_event_id)?,
            trigger_data: serde_json::from_str(&row.trigger_data)?,
            chain,
            status,
            error: row.error,
            created_at: parse_datetime(&row.created_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl AutomationRuleRunRepository for SqliteAutomationRuleRunRepository {
    async fn create(&self, run: &AutomationRuleRun) -> DomainResult<()> {
        let trigger_data = serde_json::to_string(&run.trigger_data)?;
        let chain = serde_json::to_string(&run.chain)?;

        sqlx::query(
            r#"INSERT INTO automation_rule_runs
               (id, tenant_id, collective_id, automation_rule_id, trigger_source, trigger_event_id,
                trigger_data, chain, status, error, created_at, started_at, completed_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.tenant_id.to_string())
        .bind(run.collective_id.map(|id| id.to_string()))
        .bind(run.automation_rule_id.to_string())
        .bind(run.trigger_source.as_str())
        .bind(run.trigger_event_id.map(|id| id.to_string()))
        .bind(&trigger_data)
        .bind(&chain)
        .bind(run.status.as_str())
        .bind(&run.error)
        .bind(format_datetime(run.created_at))
        .bind(run.started_at.map(format_datetime))
        .bind(run.completed_at.map(format_datetime))
        .bind(format_datetime(run.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<Option<AutomationRuleRun>> {
        let row: Option<AutomationRuleRunRow> =
            sqlx::query_as("SELECT * FROM automation_rule_runs WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id.to_string())
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(AutomationRuleRun::try_from).transpose()
    }

    async fn list_for_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> DomainResult<Vec<AutomationRuleRun>> {
        let rows: Vec<AutomationRuleRunRow> = sqlx::query_as(
            r#"SELECT * FROM automation_rule_runs
               WHERE tenant_id = ? AND automation_rule_id = ?
               ORDER BY created_at, rowid"#,
        )
        .bind(tenant_id.to_string())
        .bind(rule_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AutomationRuleRun::try_from).collect()
    }

    async fn list_by_status(
        &self,
        tenant_id: Uuid,
        status: RuleRunStatus,
    ) -> DomainResult<Vec<AutomationRuleRun>> {
        let rows: Vec<AutomationRuleRunRow> = sqlx::query_as(
            r#"SELECT * FROM automation_rule_runs
               WHERE tenant_id = ? AND status = ?
               ORDER BY created_at, rowid"#,
        )
        .bind(tenant_id.to_string())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AutomationRuleRun::try_from).collect()
    }

    async fn transition(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        from: RuleRunStatus,
        to: RuleRunStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        if !from.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        let now_str = format_datetime(now);
        let started_at = (to == RuleRunStatus::Running).then(|| now_str.clone());
        let completed_at = to.is_terminal().then(|| now_str.clone());

        let result = sqlx::query(
            r#"UPDATE automation_rule_runs
               SET status = ?, error = COALESCE(?, error),
                   started_at = COALESCE(?, started_at),
                   completed_at = COALESCE(?, completed_at),
                   updated_at = ?
               WHERE tenant_id = ? AND id = ? AND status = ?"#,
        )
        .bind(to.as_str())
        .bind(error)
        .bind(started_at)
        .bind(completed_at)
        .bind(&now_str)
        .bind(tenant_id.to_string())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_chain(&self, tenant_id: Uuid, id: Uuid, chain: &AutomationChain) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE automation_rule_runs SET chain = ?, updated_at = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(serde_json::to_string(chain)?)
        .bind(format_datetime(Utc::now()))
        .bind(tenant_id.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AutomationRuleRunNotFound(id));
        }
        Ok(())
    }

    async fn claim_in_cascade(
        &self,
        tenant_id: Uuid,
        cascade_id: Uuid,
        rule_id: Uuid,
        run_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO automation_cascade_claims
               (tenant_id, cascade_id, automation_rule_id, run_id, claimed_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(tenant_id.to_string())
        .bind(cascade_id.to_string())
        .bind(rule_id.to_string())
        .bind(run_id.to_string())
        .bind(format_datetime(now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let holder: Option<(String,)> = sqlx::query_as(
            r#"SELECT run_id FROM automation_cascade_claims
               WHERE tenant_id = ? AND cascade_id = ? AND automation_rule_id = ?"#,
        )
        .bind(tenant_id.to_string())
        .bind(cascade_id.to_string())
        .bind(rule_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(matches!(holder, Some((holder,)) if holder == run_id.to_string()))
    }

    async fn delete_cascade_claims_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM automation_cascade_claims WHERE claimed_at < ?")
            .bind(format_datetime(cutoff))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
