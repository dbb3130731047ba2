//! Agent task queue CLI commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use super::in_tenant;
use crate::cli::output::{output, short_id, table, truncate, CommandOutput};
use crate::cli::runtime::Runtime;
use crate::domain::models::{AgentTaskRun, AgentTaskStatus, Config};
use crate::domain::ports::AgentTaskRunRepository;
use crate::services::TenantScope;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Queue a task for an agent and process the agent's queue
    Enqueue {
        /// Tenant that owns the agent
        #[arg(long)]
        tenant: Uuid,

        /// Agent to run the task
        #[arg(long)]
        agent: Uuid,

        /// Task description
        description: String,

        /// Only queue the task; leave processing to a running worker's next kick
        #[arg(long)]
        no_run: bool,
    },
    /// List an agent's tasks, oldest first
    List {
        #[arg(long)]
        tenant: Uuid,

        #[arg(long)]
        agent: Uuid,

        /// Filter by status (queued, running, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show one task
    Show {
        #[arg(long)]
        tenant: Uuid,

        id: Uuid,
    },
}

#[derive(Debug, Serialize)]
pub struct TaskOutput {
    pub id: String,
    pub agent_id: String,
    pub description: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl From<&AgentTaskRun> for TaskOutput {
    fn from(run: &AgentTaskRun) -> Self {
        Self {
            id: run.id.to_string(),
            agent_id: run.agent_id.to_string(),
            description: run.task_description.clone(),
            status: run.status.as_str().to_string(),
            error: run.error.clone(),
            created_at: run.created_at.to_rfc3339(),
            started_at: run.started_at.map(|t| t.to_rfc3339()),
            completed_at: run.completed_at.map(|t| t.to_rfc3339()),
            result: run.result.as_ref().and_then(|r| serde_json::to_value(r).ok()),
        }
    }
}

impl CommandOutput for TaskOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Task: {}", self.id),
            format!("Agent: {}", self.agent_id),
            format!("Status: {}", self.status),
            format!("Created: {}", self.created_at),
        ];
        if let Some(ref started) = self.started_at {
            lines.push(format!("Started: {started}"));
        }
        if let Some(ref completed) = self.completed_at {
            lines.push(format!("Completed: {completed}"));
        }
        if let Some(ref error) = self.error {
            lines.push(format!("Error: {error}"));
        }
        lines.push(format!("\n{}", self.description));
        if let Some(ref result) = self.result {
            lines.push(format!(
                "\nResult:\n{}",
                serde_json::to_string_pretty(result).unwrap_or_default()
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskOutput>,
    pub total: usize,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }

        let mut t = table(&["ID", "STATUS", "CREATED", "DESCRIPTION"]);
        for task in &self.tasks {
            t.add_row(vec![
                short_id(&task.id),
                task.status.clone(),
                task.created_at.clone(),
                truncate(&task.description, 50),
            ]);
        }
        format!("Found {} task(s):\n{t}", self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct EnqueueOutput {
    pub task: TaskOutput,
    pub jobs_run: usize,
}

impl CommandOutput for EnqueueOutput {
    fn to_human(&self) -> String {
        format!(
            "Queued task {} for agent {} (status: {}, {} job(s) run)",
            short_id(&self.task.id),
            short_id(&self.task.agent_id),
            self.task.status,
            self.jobs_run
        )
    }
}

pub async fn execute(args: TaskArgs, config: Config, json_mode: bool) -> Result<()> {
    let (runtime, mut receiver) = Runtime::open(config).await?;

    match args.command {
        TaskCommands::Enqueue {
            tenant,
            agent,
            description,
            no_run,
        } => {
            let scheduler = runtime.scheduler.clone();
            let run = in_tenant(tenant, None, async move {
                Ok(scheduler.enqueue_task(agent, description).await?)
            })
            .await?;

            let jobs_run = if no_run { 0 } else { runtime.drain(&mut receiver).await };

            // Re-read so the output shows what processing did to the task.
            let runs = runtime.agent_runs.clone();
            let run_id = run.id;
            let latest = in_tenant(tenant, None, async move {
                let tenant_id = TenantScope::require_tenant()?;
                Ok(runs.get(tenant_id, run_id).await?)
            })
            .await?
            .unwrap_or(run);

            output(
                &EnqueueOutput {
                    task: TaskOutput::from(&latest),
                    jobs_run,
                },
                json_mode,
            );
        }

        TaskCommands::List { tenant, agent, status } => {
            let status = status
                .map(|s| AgentTaskStatus::from_str(&s).ok_or_else(|| anyhow!("Unknown task status: {s}")))
                .transpose()?;

            let runs = runtime.agent_runs.clone();
            let tasks = in_tenant(tenant, None, async move {
                let tenant_id = TenantScope::require_tenant()?;
                Ok(runs.list_for_agent(tenant_id, agent, status).await?)
            })
            .await?;

            output(
                &TaskListOutput {
                    total: tasks.len(),
                    tasks: tasks.iter().map(TaskOutput::from).collect(),
                },
                json_mode,
            );
        }

        TaskCommands::Show { tenant, id } => {
            let runs = runtime.agent_runs.clone();
            let task = in_tenant(tenant, None, async move {
                let tenant_id = TenantScope::require_tenant()?;
                Ok(runs.get(tenant_id, id).await?)
            })
            .await?
            .ok_or_else(|| anyhow!("Task not found: {id}"))?;

            output(&TaskOutput::from(&task), json_mode);
        }
    }

    Ok(())
}
