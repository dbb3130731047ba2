//! Automation rule run CLI commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use super::in_tenant;
use crate::cli::output::{output, short_id, table, truncate, CommandOutput};
use crate::cli::runtime::Runtime;
use crate::domain::models::{AutomationRuleRun, Config, RuleRunStatus};
use crate::domain::ports::AutomationRuleRunRepository;
use crate::services::TenantScope;

const ALL_STATUSES: [RuleRunStatus; 5] = [
    RuleRunStatus::Pending,
    RuleRunStatus::Running,
    RuleRunStatus::Completed,
    RuleRunStatus::Failed,
    RuleRunStatus::Skipped,
];

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(subcommand)]
    pub command: RunCommands,
}

#[derive(Subcommand, Debug)]
pub enum RunCommands {
    /// List rule runs of a tenant
    List {
        #[arg(long)]
        tenant: Uuid,

        /// Only runs of this rule
        #[arg(long)]
        rule: Option<Uuid>,

        /// Filter by status (pending, running, completed, failed, skipped)
        #[arg(short, long)]
        status: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub id: String,
    pub rule_id: String,
    pub source: String,
    pub status: String,
    pub chain_depth: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<&AutomationRuleRun> for RunOutput {
    fn from(run: &AutomationRuleRun) -> Self {
        Self {
            id: run.id.to_string(),
            rule_id: run.automation_rule_id.to_string(),
            source: run.trigger_source.as_str().to_string(),
            status: run.status.as_str().to_string(),
            chain_depth: run.chain.depth,
            error: run.error.clone(),
            created_at: run.created_at.to_rfc3339(),
            completed_at: run.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunListOutput {
    pub runs: Vec<RunOutput>,
    pub total: usize,
}

impl CommandOutput for RunListOutput {
    fn to_human(&self) -> String {
        if self.runs.is_empty() {
            return "No rule runs found.".to_string();
        }

        let mut t = table(&["ID", "RULE", "SOURCE", "STATUS", "DEPTH", "CREATED", "ERROR"]);
        for run in &self.runs {
            t.add_row(vec![
                short_id(&run.id),
                short_id(&run.rule_id),
                run.source.clone(),
                run.status.clone(),
                run.chain_depth.to_string(),
                run.created_at.clone(),
                run.error.as_deref().map_or_else(|| "-".to_string(), |e| truncate(e, 40)),
            ]);
        }
        format!("Found {} run(s):\n{t}", self.total)
    }
}

pub async fn execute(args: RunArgs, config: Config, json_mode: bool) -> Result<()> {
    let (runtime, _receiver) = Runtime::open(config).await?;
    let repo = runtime.rule_runs.clone();

    match args.command {
        RunCommands::List { tenant, rule, status } => {
            let status = status
                .map(|s| RuleRunStatus::from_str(&s).ok_or_else(|| anyhow!("Unknown run status: {s}")))
                .transpose()?;

            let mut runs = in_tenant(tenant, None, async move {
                let tenant_id = TenantScope::require_tenant()?;
                let runs = match (rule, status) {
                    (Some(rule_id), _) => repo.list_for_rule(tenant_id, rule_id).await?,
                    (None, Some(status)) => repo.list_by_status(tenant_id, status).await?,
                    (None, None) => {
                        let mut all = Vec::new();
                        for status in ALL_STATUSES {
                            all.extend(repo.list_by_status(tenant_id, status).await?);
                        }
                        all
                    }
                };
                Ok(runs)
            })
            .await?;

            if let Some(status) = status {
                runs.retain(|r| r.status == status);
            }
            runs.sort_by_key(|r| r.created_at);

            output(
                &RunListOutput {
                    total: runs.len(),
                    runs: runs.iter().map(RunOutput::from).collect(),
                },
                json_mode,
            );
        }
    }

    Ok(())
}
