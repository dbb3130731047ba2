//! Common test utilities for integration tests
//!
//! Builds the service graph over a migrated SQLite pool and a recording
//! dispatcher, so tests can run dispatched jobs one step at a time.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use collective_worker::adapters::jobs::RecordingDispatcher;
use collective_worker::adapters::sqlite::{
    create_migrated_test_pool, initialize_database, PoolConfig, SqliteAgentTaskRunRepository,
    SqliteAutomationRuleRepository, SqliteAutomationRuleRunRepository,
};
use collective_worker::application::{JobError, JobReport, JobRunner};
use collective_worker::domain::models::{
    AgentTaskRun, AutomationRule, AutomationRuleRun, ChainLimits, DomainEvent, SchedulerConfig,
    TaskResult,
};
use collective_worker::domain::ports::{
    ActionOutcome, AgentTaskExecutor, AutomationActionExecutor, Job,
};
use collective_worker::services::{
    AgentTaskScheduler, AutomationRunExecutor, AutomationTrigger, ContextGuard, ContextSnapshot,
    CronTrigger, ExecutionContext, TenantScope,
};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

/// Agent executor that records what it ran and how many ran at once.
///
/// Descriptions starting with `fail` return an error, `panic` panics.
#[derive(Default)]
pub struct ScriptedAgentExecutor {
    pub executed: Mutex<Vec<String>>,
    pub contexts: Mutex<Vec<ContextSnapshot>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub delay: Duration,
}

impl ScriptedAgentExecutor {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn contexts(&self) -> Vec<ContextSnapshot> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentTaskExecutor for ScriptedAgentExecutor {
    async fn execute(&self, run: &AgentTaskRun) -> anyhow::Result<TaskResult> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(ExecutionContext::current());
        self.executed.lock().unwrap().push(run.task_description.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if run.task_description.starts_with("panic") {
            panic!("scripted panic for {}", run.id);
        }
        if run.task_description.starts_with("fail") {
            return Err(anyhow!("scripted failure"));
        }
        Ok(TaskResult::succeeded(format!("done: {}", run.task_description)).with_usage(10, 5, 0.001))
    }
}

/// Action executor that emits configured events per rule name, in the
/// order they were configured.
///
/// Rules named `broken` fail, rules named `explode` panic.
#[derive(Default)]
pub struct ScriptedActionExecutor {
    emits: Mutex<HashMap<String, Vec<String>>>,
    pub executed: Mutex<Vec<(String, ContextSnapshot)>>,
}

impl ScriptedActionExecutor {
    /// When `rule_name` runs, emit an event of `event_type`. Repeat to emit
    /// several events from one run.
    pub fn emit(self, rule_name: &str, event_type: &str) -> Self {
        self.emits
            .lock()
            .unwrap()
            .entry(rule_name.to_string())
            .or_default()
            .push(event_type.to_string());
        self
    }

    pub fn executed_rules(&self) -> Vec<String> {
        self.executed.lock().unwrap().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn contexts(&self) -> Vec<ContextSnapshot> {
        self.executed.lock().unwrap().iter().map(|(_, ctx)| *ctx).collect()
    }
}

#[async_trait]
impl AutomationActionExecutor for ScriptedActionExecutor {
    async fn execute(&self, rule: &AutomationRule, run: &AutomationRuleRun) -> anyhow::Result<ActionOutcome> {
        self.executed
            .lock()
            .unwrap()
            .push((rule.name.clone(), ExecutionContext::current()));

        match rule.name.as_str() {
            "broken" => return Err(anyhow!("action backend unavailable")),
            "explode" => panic!("action exploded"),
            _ => {}
        }

        let emitted = self.emits.lock().unwrap().get(&rule.name).cloned().unwrap_or_default();
        let mut outcome = ActionOutcome::default();
        for event_type in emitted {
            let mut event = DomainEvent::new(run.tenant_id, event_type);
            if let Some(collective_id) = run.collective_id {
                event = event.in_collective(collective_id);
            }
            outcome = outcome.with_event(event);
        }
        Ok(outcome)
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub agent_runs: Arc<SqliteAgentTaskRunRepository>,
    pub rules: Arc<SqliteAutomationRuleRepository>,
    pub rule_runs: Arc<SqliteAutomationRuleRunRepository>,
    pub dispatcher: RecordingDispatcher,
    pub agent_executor: Arc<ScriptedAgentExecutor>,
    pub action_executor: Arc<ScriptedActionExecutor>,
    pub scheduler: Arc<AgentTaskScheduler>,
    pub trigger: Arc<AutomationTrigger>,
    pub automation: Arc<AutomationRunExecutor>,
    pub cron: Arc<CronTrigger>,
    pub runner: Arc<JobRunner>,
}

pub struct HarnessBuilder {
    agent_executor: ScriptedAgentExecutor,
    action_executor: ScriptedActionExecutor,
    limits: ChainLimits,
    scheduler: SchedulerConfig,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            agent_executor: ScriptedAgentExecutor::default(),
            action_executor: ScriptedActionExecutor::default(),
            limits: ChainLimits::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    /// Run dispatched jobs, and the jobs they dispatch, until none are left.
    pub async fn drain(&self) -> Vec<Result<JobReport, JobError>> {
        let mut reports = Vec::new();
        for _ in 0..100 {
            let jobs = self.dispatcher.take();
            if jobs.is_empty() {
                return reports;
            }
            for job in jobs {
                reports.push(self.runner.run(job).await);
            }
        }
        panic!("job queue did not settle after 100 rounds");
    }

    pub async fn run(&self, job: Job) -> Result<JobReport, JobError> {
        self.runner.run(job).await
    }
}

impl HarnessBuilder {
    pub fn agent_executor(mut self, executor: ScriptedAgentExecutor) -> Self {
        self.agent_executor = executor;
        self
    }

    pub fn action_executor(mut self, executor: ScriptedActionExecutor) -> Self {
        self.action_executor = executor;
        self
    }

    pub fn limits(mut self, limits: ChainLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    pub async fn build(self) -> Harness {
        let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
        self.build_with_pool(pool)
    }

    pub fn build_with_pool(self, pool: SqlitePool) -> Harness {
        let agent_runs = Arc::new(SqliteAgentTaskRunRepository::new(pool.clone()));
        let rules = Arc::new(SqliteAutomationRuleRepository::new(pool.clone()));
        let rule_runs = Arc::new(SqliteAutomationRuleRunRepository::new(pool.clone()));
        let dispatcher = RecordingDispatcher::new();
        let agent_executor = Arc::new(self.agent_executor);
        let action_executor = Arc::new(self.action_executor);

        let scheduler = Arc::new(AgentTaskScheduler::new(
            agent_runs.clone(),
            agent_executor.clone(),
            Arc::new(dispatcher.clone()),
            &self.scheduler,
        ));
        let trigger = Arc::new(AutomationTrigger::new(
            rules.clone(),
            rule_runs.clone(),
            Arc::new(dispatcher.clone()),
            self.limits,
        ));
        let automation = Arc::new(AutomationRunExecutor::new(
            rules.clone(),
            rule_runs.clone(),
            action_executor.clone(),
            trigger.clone(),
        ));
        let cron = Arc::new(CronTrigger::new(rules.clone(), trigger.clone()));
        let runner = Arc::new(JobRunner::new(
            scheduler.clone(),
            automation.clone(),
            cron.clone(),
            Arc::new(dispatcher.clone()),
        ));

        Harness {
            pool,
            agent_runs,
            rules,
            rule_runs,
            dispatcher,
            agent_executor,
            action_executor,
            scheduler,
            trigger,
            automation,
            cron,
            runner,
        }
    }
}

/// File-backed pool with several connections, for tests that need real
/// concurrent transactions. Keep the `TempDir` alive for the test.
pub async fn file_pool() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}", dir.path().join("test.db").display());
    let config = PoolConfig {
        max_connections: 8,
        ..PoolConfig::default()
    };
    let pool = initialize_database(&url, Some(config))
        .await
        .expect("Failed to create file-backed pool");
    (dir, pool)
}

/// Run `body` as a unit of work with `tenant_id` established.
pub async fn as_tenant<F: Future>(tenant_id: Uuid, body: F) -> F::Output {
    ContextGuard::run(async move {
        TenantScope::establish_tenant(tenant_id).expect("Failed to establish tenant");
        body.await
    })
    .await
}

/// Run `body` as a unit of work with no tenant.
pub async fn as_system<F: Future>(body: F) -> F::Output {
    ContextGuard::run(body).await
}
