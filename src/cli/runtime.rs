//! Wiring of repositories, services and the job runner for one process.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

use crate::adapters::executors::{LoggingActionExecutor, LoggingAgentTaskExecutor};
use crate::adapters::jobs::{InProcessDispatcher, JobReceiver};
use crate::adapters::sqlite::{
    initialize_database, PoolConfig, SqliteAgentTaskRunRepository, SqliteAutomationRuleRepository,
    SqliteAutomationRuleRunRepository,
};
use crate::application::JobRunner;
use crate::domain::models::Config;
use crate::domain::ports::JobDispatcher;
use crate::services::{AgentTaskScheduler, AutomationRunExecutor, AutomationTrigger, CronTrigger};

pub struct Runtime {
    pub config: Config,
    pub pool: SqlitePool,
    pub agent_runs: Arc<SqliteAgentTaskRunRepository>,
    pub rules: Arc<SqliteAutomationRuleRepository>,
    pub rule_runs: Arc<SqliteAutomationRuleRunRepository>,
    pub dispatcher: Arc<InProcessDispatcher>,
    pub scheduler: Arc<AgentTaskScheduler>,
    pub runner: Arc<JobRunner>,
}

impl Runtime {
    /// Open the database and build the service graph around an in-process
    /// job queue. The receiver feeds either a [`crate::application::Worker`]
    /// or [`Runtime::drain`].
    pub async fn open(config: Config) -> Result<(Self, JobReceiver)> {
        let pool = initialize_database(&config.database.url(), Some(PoolConfig::from(&config.database)))
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;

        let agent_runs = Arc::new(SqliteAgentTaskRunRepository::new(pool.clone()));
        let rules = Arc::new(SqliteAutomationRuleRepository::new(pool.clone()));
        let rule_runs = Arc::new(SqliteAutomationRuleRunRepository::new(pool.clone()));

        let (dispatcher, receiver) = InProcessDispatcher::new();
        let dispatcher = Arc::new(dispatcher);
        let jobs: Arc<dyn JobDispatcher> = dispatcher.clone();

        let scheduler = Arc::new(AgentTaskScheduler::new(
            agent_runs.clone(),
            Arc::new(LoggingAgentTaskExecutor),
            jobs.clone(),
            &config.scheduler,
        ));
        let trigger = Arc::new(AutomationTrigger::new(
            rules.clone(),
            rule_runs.clone(),
            jobs.clone(),
            config.automation.limits(),
        ));
        let automation = Arc::new(AutomationRunExecutor::new(
            rules.clone(),
            rule_runs.clone(),
            Arc::new(LoggingActionExecutor),
            trigger.clone(),
        ));
        let cron = Arc::new(CronTrigger::new(rules.clone(), trigger.clone()));

        let runner = Arc::new(
            JobRunner::new(scheduler.clone(), automation, cron, jobs)
                .with_rearm_delay(config.scheduler.rearm_delay())
                .with_retention_days(config.worker.retention_days),
        );

        let runtime = Self {
            config,
            pool,
            agent_runs,
            rules,
            rule_runs,
            dispatcher,
            scheduler,
            runner,
        };
        Ok((runtime, receiver))
    }

    /// Run queued jobs, including the ones they enqueue, until the queue is
    /// empty. Delayed jobs still sleeping are not waited for.
    pub async fn drain(&self, receiver: &mut JobReceiver) -> usize {
        let mut ran = 0;
        while let Ok(job) = receiver.try_recv() {
            // Failures are logged by the runner and recorded on rows.
            let _ = self.runner.run(job).await;
            ran += 1;
        }
        debug!(jobs = ran, "queue drained");
        ran
    }
}
