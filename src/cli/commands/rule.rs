//! Automation rule CLI commands.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use super::in_tenant;
use crate::cli::output::{output, short_id, table, truncate, ActionOutput, CommandOutput};
use crate::cli::runtime::Runtime;
use crate::domain::models::{AutomationRule, Config, CronSchedule, RuleAction, RuleTrigger};
use crate::domain::ports::AutomationRuleRepository;
use crate::services::TenantScope;

#[derive(Args, Debug)]
pub struct RuleArgs {
    #[command(subcommand)]
    pub command: RuleCommands,
}

/// Fields shared by every new rule.
#[derive(Args, Debug)]
pub struct NewRuleArgs {
    /// Tenant that owns the rule
    #[arg(long)]
    pub tenant: Uuid,

    /// Bind the rule to one collective of the tenant
    #[arg(long)]
    pub collective: Option<Uuid>,

    /// Rule name
    #[arg(long)]
    pub name: String,

    /// Action type handed to the action executor
    #[arg(long, default_value = "log")]
    pub action: String,

    /// JSON configuration for the action
    #[arg(long)]
    pub action_config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RuleCommands {
    /// Add a rule that fires on an event type
    AddEvent {
        #[command(flatten)]
        rule: NewRuleArgs,

        /// Event type to listen for, e.g. note.created
        #[arg(long)]
        event_type: String,
    },
    /// Add a rule that fires on a cron schedule
    AddSchedule {
        #[command(flatten)]
        rule: NewRuleArgs,

        /// Cron expression; five fields imply second 0
        #[arg(long)]
        cron: String,

        /// IANA timezone the expression is evaluated in
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },
    /// List a tenant's rules
    List {
        #[arg(long)]
        tenant: Uuid,
    },
    /// Enable a rule
    Enable {
        #[arg(long)]
        tenant: Uuid,

        id: Uuid,
    },
    /// Disable a rule
    Disable {
        #[arg(long)]
        tenant: Uuid,

        id: Uuid,
    },
    /// Delete a rule
    Delete {
        #[arg(long)]
        tenant: Uuid,

        id: Uuid,
    },
}

#[derive(Debug, Serialize)]
pub struct RuleOutput {
    pub id: String,
    pub name: String,
    pub trigger: String,
    pub collective_id: Option<String>,
    pub enabled: bool,
    pub execution_count: u64,
    pub last_executed_at: Option<String>,
    pub actions: Vec<String>,
}

impl From<&AutomationRule> for RuleOutput {
    fn from(rule: &AutomationRule) -> Self {
        let trigger = match &rule.trigger {
            RuleTrigger::Event { event_type } => format!("event {event_type}"),
            RuleTrigger::Schedule { cron, timezone } => format!("cron '{cron}' ({timezone})"),
        };
        Self {
            id: rule.id.to_string(),
            name: rule.name.clone(),
            trigger,
            collective_id: rule.collective_id.map(|c| c.to_string()),
            enabled: rule.enabled,
            execution_count: rule.execution_count,
            last_executed_at: rule.last_executed_at.map(|t| t.to_rfc3339()),
            actions: rule.actions.iter().map(|a| a.action_type.clone()).collect(),
        }
    }
}

impl CommandOutput for RuleOutput {
    fn to_human(&self) -> String {
        format!("Rule created: {} ({}) on {}", self.name, self.id, self.trigger)
    }
}

#[derive(Debug, Serialize)]
pub struct RuleListOutput {
    pub rules: Vec<RuleOutput>,
    pub total: usize,
}

impl CommandOutput for RuleListOutput {
    fn to_human(&self) -> String {
        if self.rules.is_empty() {
            return "No automation rules found.".to_string();
        }

        let mut t = table(&["ID", "NAME", "TRIGGER", "ENABLED", "RUNS", "LAST RUN"]);
        for rule in &self.rules {
            t.add_row(vec![
                short_id(&rule.id),
                truncate(&rule.name, 28),
                rule.trigger.clone(),
                if rule.enabled { "yes" } else { "no" }.to_string(),
                rule.execution_count.to_string(),
                rule.last_executed_at.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }
        format!("Found {} rule(s):\n{t}", self.total)
    }
}

fn build_rule(args: NewRuleArgs, trigger: RuleTrigger) -> Result<AutomationRule> {
    let action_config = match args.action_config {
        Some(raw) => serde_json::from_str(&raw).context("--action-config must be JSON")?,
        None => serde_json::Value::Null,
    };

    let mut rule = AutomationRule::new(args.tenant, args.name, trigger)
        .with_action(RuleAction::new(args.action, action_config));
    if let Some(collective_id) = args.collective {
        rule = rule.in_collective(collective_id);
    }
    Ok(rule)
}

pub async fn execute(args: RuleArgs, config: Config, json_mode: bool) -> Result<()> {
    let (runtime, _receiver) = Runtime::open(config).await?;
    let repo = runtime.rules.clone();

    match args.command {
        RuleCommands::AddEvent { rule, event_type } => {
            let tenant = rule.tenant;
            let rule = build_rule(rule, RuleTrigger::Event { event_type })?;
            create(repo, tenant, rule, json_mode).await?;
        }

        RuleCommands::AddSchedule { rule, cron, timezone } => {
            // Reject bad expressions here rather than at sweep time.
            CronSchedule::parse(&cron, &timezone)?;
            let tenant = rule.tenant;
            let rule = build_rule(rule, RuleTrigger::Schedule { cron, timezone })?;
            create(repo, tenant, rule, json_mode).await?;
        }

        RuleCommands::List { tenant } => {
            let rules = in_tenant(tenant, None, async move {
                let tenant_id = TenantScope::require_tenant()?;
                Ok(repo.list(tenant_id).await?)
            })
            .await?;

            output(
                &RuleListOutput {
                    total: rules.len(),
                    rules: rules.iter().map(RuleOutput::from).collect(),
                },
                json_mode,
            );
        }

        RuleCommands::Enable { tenant, id } => {
            let name = set_enabled(repo, tenant, id, true).await?;
            output(&ActionOutput::ok(format!("Rule enabled: {name}")), json_mode);
        }

        RuleCommands::Disable { tenant, id } => {
            let name = set_enabled(repo, tenant, id, false).await?;
            output(&ActionOutput::ok(format!("Rule disabled: {name}")), json_mode);
        }

        RuleCommands::Delete { tenant, id } => {
            in_tenant(tenant, None, async move {
                let tenant_id = TenantScope::require_tenant()?;
                Ok(repo.delete(tenant_id, id).await?)
            })
            .await?;
            output(&ActionOutput::ok(format!("Rule deleted: {id}")), json_mode);
        }
    }

    Ok(())
}

async fn create<R>(repo: std::sync::Arc<R>, tenant: Uuid, rule: AutomationRule, json_mode: bool) -> Result<()>
where
    R: AutomationRuleRepository + ?Sized,
{
    let rule = in_tenant(tenant, rule.collective_id, async move {
        TenantScope::require_tenant()?;
        repo.create(&rule).await?;
        Ok(rule)
    })
    .await?;

    output(&RuleOutput::from(&rule), json_mode);
    Ok(())
}

async fn set_enabled<R>(repo: std::sync::Arc<R>, tenant: Uuid, id: Uuid, enabled: bool) -> Result<String>
where
    R: AutomationRuleRepository + ?Sized,
{
    in_tenant(tenant, None, async move {
        let tenant_id = TenantScope::require_tenant()?;
        let mut rule = repo
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| anyhow!("Rule not found: {id}"))?;
        rule.enabled = enabled;
        repo.update(&rule).await?;
        Ok(rule.name)
    })
    .await
}
