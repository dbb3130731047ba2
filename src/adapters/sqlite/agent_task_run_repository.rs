//! SQLite implementation of the AgentTaskRunRepository.
//!
//! The claim runs as one write transaction. Its first statement is the
//! stuck-task recovery update, so the transaction holds SQLite's write lock
//! from the start and concurrent claimers wait on the busy timeout rather
//! than racing between check and update. The lock is database-wide, which
//! is broader than one agent, but it is held only for three short
//! statements. The partial unique index on running rows backs the
//! single-running invariant at the storage level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{
    format_datetime, parse_datetime, parse_optional_datetime, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentTaskRun, AgentTaskStatus, TaskResult};
use crate::domain::ports::{AgentTaskRunRepository, ClaimOutcome, ClaimResult, StuckAgent};

#[derive(Clone)]
pub struct SqliteAgentTaskRunRepository {
    pool: SqlitePool,
}

impl SqliteAgentTaskRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AgentTaskRunRow {
    id: String,
    tenant_id: String,
    agent_id: String,
    task_description: String,
    status: String,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    updated_at: String,
}

impl TryFrom<AgentTaskRunRow> for AgentTaskRun {
    type Error = DomainError;

    fn try_from(row: AgentTaskRunRow) -> Result<Self, Self::Error> {
        let status = AgentTaskStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid agent task status: {}", row.status))
        })?;
        let result: Option<TaskResult> = row
            .result
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(AgentTaskRun {
            id: parse_uuid(&row.id)?,
            tenant_id: parse_uuid(&row.tenant_id)?,
            agent_id: parse_uuid(&row.agent_id)?,
            task_description: row.task_description,
            status,
            result,
            error: row.error,
            created_at: parse_datetime(&row.created_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl AgentTaskRunRepository for SqliteAgentTaskRunRepository {
    async fn insert(&self, run: &AgentTaskRun) -> DomainResult<()> {
        let result_json = run.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO agent_task_runs
               (id, tenant_id, agent_id, task_description, status, result, error,
                created_at, started_at, completed_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.tenant_id.to_string())
        .bind(run.agent_id.to_string())
        .bind(&run.task_description)
        .bind(run.status.as_str())
        .bind(result_json)
        .bind(&run.error)
        .bind(format_datetime(run.created_at))
        .bind(run.started_at.map(format_datetime))
        .bind(run.completed_at.map(format_datetime))
        .bind(format_datetime(run.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<Option<AgentTaskRun>> {
        let row: Option<AgentTaskRunRow> =
            sqlx::query_as("SELECT * FROM agent_task_runs WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id.to_string())
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(AgentTaskRun::try_from).transpose()
    }

    async fn list_for_agent(
        &self,
        tenant_id: Uuid,
        agent_id: Uuid,
        status: Option<AgentTaskStatus>,
    ) -> DomainResult<Vec<AgentTaskRun>> {
        let mut query = String::from("SELECT * FROM agent_task_runs WHERE tenant_id = ? AND agent_id = ?");
        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY created_at, rowid");

        let mut q = sqlx::query_as::<_, AgentTaskRunRow>(&query)
            .bind(tenant_id.to_string())
            .bind(agent_id.to_string());
        if let Some(status) = status {
            q = q.bind(status.as_str());
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(AgentTaskRun::try_from).collect()
    }

    async fn claim_next(
        &self,
        tenant_id: Uuid,
        agent_id: Uuid,
        now: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
    ) -> DomainResult<ClaimOutcome> {
        let tenant = tenant_id.to_string();
        let agent = agent_id.to_string();
        let now_str = format_datetime(now);
        let stuck_error = format!(
            "Task exceeded the stuck timeout (started before {}) and was marked failed",
            format_datetime(stuck_before)
        );

        let mut tx = self.pool.begin().await?;

        let recovered: Vec<(String,)> = sqlx::query_as(
            r#"UPDATE agent_task_runs
               SET status = 'failed', error = ?, completed_at = ?, updated_at = ?
               WHERE tenant_id = ? AND agent_id = ? AND status = 'running' AND started_at < ?
               RETURNING id"#,
        )
        .bind(&stuck_error)
        .bind(&now_str)
        .bind(&now_str)
        .bind(&tenant)
        .bind(&agent)
        .bind(format_datetime(stuck_before))
        .fetch_all(&mut *tx)
        .await?;
        let recovered = recovered
            .iter()
            .map(|(id,)| parse_uuid(id))
            .collect::<DomainResult<Vec<_>>>()?;

        let running: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM agent_task_runs WHERE tenant_id = ? AND agent_id = ? AND status = 'running' LIMIT 1",
        )
        .bind(&tenant)
        .bind(&agent)
        .fetch_optional(&mut *tx)
        .await?;
        if running.is_some() {
            tx.commit().await?;
            return Ok(ClaimOutcome {
                recovered,
                result: ClaimResult::Busy,
            });
        }

        let claimed: Option<AgentTaskRunRow> = sqlx::query_as(
            r#"UPDATE agent_task_runs
               SET status = 'running', started_at = ?, updated_at = ?
               WHERE id = (
                   SELECT id FROM agent_task_runs
                   WHERE tenant_id = ? AND agent_id = ? AND status = 'queued'
                   ORDER BY created_at, rowid
                   LIMIT 1
               )
               AND status = 'queued'
               AND NOT EXISTS (
                   SELECT 1 FROM agent_task_runs
                   WHERE tenant_id = ? AND agent_id = ? AND status = 'running'
               )
               RETURNING *"#,
        )
        .bind(&now_str)
        .bind(&now_str)
        .bind(&tenant)
        .bind(&agent)
        .bind(&tenant)
        .bind(&agent)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        let result = match claimed {
            Some(row) => ClaimResult::Claimed(AgentTaskRun::try_from(row)?),
            None => ClaimResult::Empty,
        };
        Ok(ClaimOutcome { recovered, result })
    }

    async fn finish(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        result: &TaskResult,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let result_json = serde_json::to_string(result)?;
        let now_str = format_datetime(now);

        let outcome = sqlx::query(
            r#"UPDATE agent_task_runs
               SET status = ?, result = ?, error = ?, completed_at = ?, updated_at = ?
               WHERE tenant_id = ? AND id = ? AND status = 'running'"#,
        )
        .bind(result.status().as_str())
        .bind(result_json)
        .bind(&result.error)
        .bind(&now_str)
        .bind(&now_str)
        .bind(tenant_id.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn find_stuck(&self, stuck_before: DateTime<Utc>) -> DomainResult<Vec<StuckAgent>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT DISTINCT tenant_id, agent_id FROM agent_task_runs
               WHERE status = 'running' AND started_at < ?
               ORDER BY tenant_id, agent_id"#,
        )
        .bind(format_datetime(stuck_before))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(tenant_id, agent_id)| -> DomainResult<StuckAgent> {
                Ok(StuckAgent {
                    tenant_id: parse_uuid(&tenant_id)?,
                    agent_id: parse_uuid(&agent_id)?,
                })
            })
            .collect()
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM agent_task_runs
               WHERE status IN ('completed', 'failed') AND completed_at < ?"#,
        )
        .bind(format_datetime(cutoff))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
