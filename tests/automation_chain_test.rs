//! Event-triggered automation cascades and their chain bounds.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collective_worker::adapters::sqlite::SqliteAutomationRuleRepository;
use collective_worker::application::JobReport;
use collective_worker::domain::errors::{DomainError, DomainResult};
use collective_worker::domain::models::{
    AutomationRule, AutomationRuleRun, ChainLimits, DomainEvent, RuleAction, RuleRunStatus,
    TriggerSource, MAX_CHAIN_DEPTH,
};
use collective_worker::domain::ports::{AutomationRuleRepository, AutomationRuleRunRepository, Job};
use collective_worker::services::{AutomationRunExecutor, RunOutcome};
use common::{as_tenant, Harness, ScriptedActionExecutor};
use uuid::Uuid;

async fn add_rule(h: &Harness, tenant: Uuid, name: &str, event_type: &str) -> AutomationRule {
    let rule = AutomationRule::on_event(tenant, name, event_type)
        .with_action(RuleAction::new("notify", serde_json::json!({ "channel": name })));
    h.rules.create(&rule).await.unwrap();
    rule
}

async fn runs_of(h: &Harness, rule: &AutomationRule) -> Vec<AutomationRuleRun> {
    h.rule_runs.list_for_rule(rule.tenant_id, rule.id).await.unwrap()
}

async fn emit(h: &Harness, event: DomainEvent) -> Vec<AutomationRuleRun> {
    as_tenant(event.tenant_id, h.trigger.dispatch_event(&event, None))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_linear_cascade_stops_at_depth_cap() {
    let h = Harness::builder()
        .action_executor(
            ScriptedActionExecutor::default()
                .emit("r1", "b")
                .emit("r2", "c")
                .emit("r3", "d")
                .emit("r4", "e"),
        )
        .build()
        .await;
    let tenant = Uuid::new_v4();
    let r1 = add_rule(&h, tenant, "r1", "a").await;
    let r2 = add_rule(&h, tenant, "r2", "b").await;
    let r3 = add_rule(&h, tenant, "r3", "c").await;
    let r4 = add_rule(&h, tenant, "r4", "d").await;

    let origin = DomainEvent::new(tenant, "a");
    emit(&h, origin.clone()).await;
    h.drain().await;

    assert_eq!(h.action_executor.executed_rules(), vec!["r1", "r2", "r3"]);
    for (depth, rule) in [&r1, &r2, &r3].into_iter().enumerate() {
        let runs = runs_of(&h, rule).await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RuleRunStatus::Completed);
        assert_eq!(runs[0].chain.depth as usize, depth + 1);
        assert_eq!(runs[0].chain.origin_event_id, Some(origin.id));
    }
    assert_eq!(runs_of(&h, &r3).await[0].chain.depth, MAX_CHAIN_DEPTH);
    assert!(runs_of(&h, &r4).await.is_empty(), "depth cap should stop the fourth hop");
}

#[tokio::test]
async fn test_rule_loop_is_cut_after_one_round() {
    let h = Harness::builder()
        .action_executor(ScriptedActionExecutor::default().emit("ping", "pong").emit("pong", "ping"))
        .build()
        .await;
    let tenant = Uuid::new_v4();
    let ping = add_rule(&h, tenant, "ping", "ping").await;
    let pong = add_rule(&h, tenant, "pong", "pong").await;

    emit(&h, DomainEvent::new(tenant, "ping")).await;
    h.drain().await;

    assert_eq!(h.action_executor.executed_rules(), vec!["ping", "pong"]);
    assert_eq!(runs_of(&h, &ping).await.len(), 1);
    assert_eq!(runs_of(&h, &pong).await.len(), 1);
}

#[tokio::test]
async fn test_fan_out_is_bounded_by_breadth_cap() {
    let h = Harness::builder()
        .limits(ChainLimits {
            max_depth: 3,
            max_rules: 3,
        })
        .build()
        .await;
    let tenant = Uuid::new_v4();
    for i in 0..5 {
        add_rule(&h, tenant, &format!("listener {i}"), "storm").await;
    }

    let created = emit(&h, DomainEvent::new(tenant, "storm")).await;
    assert_eq!(created.len(), 3);
    for (i, run) in created.iter().enumerate() {
        assert_eq!(run.chain.depth, 0, "siblings share the parent depth");
        assert_eq!(run.chain.executed_rule_ids.len(), i);
    }

    h.drain().await;
    assert_eq!(h.action_executor.executed_rules().len(), 3);
}

#[tokio::test]
async fn test_only_matching_enabled_rules_fire() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();
    let collective = Uuid::new_v4();

    let listener = add_rule(&h, tenant, "listener", "note.created").await;
    add_rule(&h, tenant, "other type", "note.deleted").await;
    let disabled = AutomationRule::on_event(tenant, "disabled", "note.created").disabled();
    h.rules.create(&disabled).await.unwrap();
    let elsewhere = AutomationRule::on_event(tenant, "elsewhere", "note.created").in_collective(Uuid::new_v4());
    h.rules.create(&elsewhere).await.unwrap();
    let here = AutomationRule::on_event(tenant, "here", "note.created").in_collective(collective);
    h.rules.create(&here).await.unwrap();
    add_rule(&h, Uuid::new_v4(), "other tenant", "note.created").await;

    let event = DomainEvent::new(tenant, "note.created")
        .in_collective(collective)
        .with_subject(Uuid::new_v4());
    let created = emit(&h, event.clone()).await;

    let mut fired: Vec<Uuid> = created.iter().map(|r| r.automation_rule_id).collect();
    fired.sort();
    let mut expected = vec![listener.id, here.id];
    expected.sort();
    assert_eq!(fired, expected);

    for run in &created {
        assert_eq!(run.status, RuleRunStatus::Pending);
        assert_eq!(run.trigger_source, TriggerSource::Event);
        assert_eq!(run.trigger_event_id, Some(event.id));
        assert_eq!(run.collective_id, Some(collective));
        assert_eq!(run.trigger_data["event_type"], "note.created");
    }
    assert_eq!(h.dispatcher.jobs().len(), 2);
}

#[tokio::test]
async fn test_actions_run_with_collective_and_run_id_established() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();
    let collective = Uuid::new_v4();
    let rule = AutomationRule::on_event(tenant, "scoped", "decision.made").in_collective(collective);
    h.rules.create(&rule).await.unwrap();

    let created = emit(&h, DomainEvent::new(tenant, "decision.made").in_collective(collective)).await;
    h.drain().await;

    let contexts = h.action_executor.contexts();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].tenant_id, Some(tenant));
    assert_eq!(contexts[0].collective_id, Some(collective));
    assert_eq!(contexts[0].automation_run_id, Some(created[0].id));

    let rule = h.rules.get(tenant, rule.id).await.unwrap().unwrap();
    assert_eq!(rule.execution_count, 1);
    assert!(rule.last_executed_at.is_some());
}

#[tokio::test]
async fn test_redelivered_run_executes_once() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();
    add_rule(&h, tenant, "once", "note.created").await;

    emit(&h, DomainEvent::new(tenant, "note.created")).await;
    let job = h.dispatcher.take().remove(0);
    assert!(matches!(job, Job::ExecuteAutomationRun { .. }));

    let first = h.run(job.clone()).await.unwrap();
    assert_eq!(first, JobReport::AutomationRun(RunOutcome::Completed { follow_up_runs: 0 }));
    let second = h.run(job).await.unwrap();
    assert_eq!(
        second,
        JobReport::AutomationRun(RunOutcome::AlreadyHandled {
            status: RuleRunStatus::Completed
        })
    );
    assert_eq!(h.action_executor.executed_rules(), vec!["once"]);
}

#[tokio::test]
async fn test_action_errors_and_panics_are_recorded() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();
    let broken = add_rule(&h, tenant, "broken", "note.created").await;
    let explode = add_rule(&h, tenant, "explode", "note.created").await;

    emit(&h, DomainEvent::new(tenant, "note.created")).await;
    let reports = h.drain().await;
    assert!(reports.iter().all(Result::is_ok), "action failures are not job failures");

    let broken_run = &runs_of(&h, &broken).await[0];
    assert_eq!(broken_run.status, RuleRunStatus::Failed);
    assert_eq!(broken_run.error.as_deref(), Some("action backend unavailable"));
    assert!(broken_run.completed_at.is_some());

    let explode_run = &runs_of(&h, &explode).await[0];
    assert_eq!(explode_run.status, RuleRunStatus::Failed);
    assert!(explode_run.error.as_deref().unwrap().contains("panicked"));
}

#[tokio::test]
async fn test_rule_disabled_before_execution_is_skipped() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();
    let mut rule = add_rule(&h, tenant, "flaky", "note.created").await;

    emit(&h, DomainEvent::new(tenant, "note.created")).await;
    rule.enabled = false;
    h.rules.update(&rule).await.unwrap();
    h.drain().await;

    let run = &runs_of(&h, &rule).await[0];
    assert_eq!(run.status, RuleRunStatus::Skipped);
    assert!(run.error.as_deref().unwrap().contains("disabled"));
    assert!(h.action_executor.executed_rules().is_empty());
}

#[tokio::test]
async fn test_manual_trigger_starts_fresh_chain() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();
    let rule = add_rule(&h, tenant, "manual", "never.emitted").await;

    let run = as_tenant(
        tenant,
        h.trigger.trigger_rule(
            &rule,
            TriggerSource::Manual,
            serde_json::json!({ "requested_by": "operator" }),
            Default::default(),
        ),
    )
    .await
    .unwrap();
    h.drain().await;

    let run = h.rule_runs.get(tenant, run.id).await.unwrap().unwrap();
    assert_eq!(run.status, RuleRunStatus::Completed);
    assert_eq!(run.trigger_source, TriggerSource::Manual);
    assert_eq!(run.chain.depth, 1);
    assert_eq!(run.chain.origin_event_id, None);
    assert_eq!(run.chain.root_run_id, Some(run.id));
}

fn statuses(runs: &[AutomationRuleRun]) -> Vec<RuleRunStatus> {
    let mut statuses: Vec<RuleRunStatus> = runs.iter().map(|run| run.status).collect();
    statuses.sort_by_key(|status| status.as_str());
    statuses
}

#[tokio::test]
async fn test_converging_branches_run_rule_once() {
    let h = Harness::builder()
        .action_executor(
            ScriptedActionExecutor::default()
                .emit("left", "joined")
                .emit("right", "joined")
                .emit("join", "after"),
        )
        .build()
        .await;
    let tenant = Uuid::new_v4();
    add_rule(&h, tenant, "left", "split").await;
    add_rule(&h, tenant, "right", "split").await;
    let join = add_rule(&h, tenant, "join", "joined").await;
    let after = add_rule(&h, tenant, "after", "after").await;

    emit(&h, DomainEvent::new(tenant, "split")).await;
    let reports = h.drain().await;
    assert!(reports.iter().all(Result::is_ok));

    let mut executed = h.action_executor.executed_rules();
    executed.sort();
    assert_eq!(executed, vec!["after", "join", "left", "right"]);

    // Both branches queued the join; only the first to start ran it.
    let join_runs = runs_of(&h, &join).await;
    assert_eq!(statuses(&join_runs), vec![RuleRunStatus::Completed, RuleRunStatus::Skipped]);
    let skipped = join_runs
        .iter()
        .find(|run| run.status == RuleRunStatus::Skipped)
        .unwrap();
    assert!(skipped.error.as_deref().unwrap().contains("already executed"));
    assert_eq!(runs_of(&h, &after).await.len(), 1);

    let join = h.rules.get(tenant, join.id).await.unwrap().unwrap();
    assert_eq!(join.execution_count, 1);
}

#[tokio::test]
async fn test_converging_branches_of_manual_cascade_run_rule_once() {
    let h = Harness::builder()
        .action_executor(
            ScriptedActionExecutor::default()
                .emit("start", "split")
                .emit("left", "joined")
                .emit("right", "joined"),
        )
        .build()
        .await;
    let tenant = Uuid::new_v4();
    let start = add_rule(&h, tenant, "start", "never.emitted").await;
    add_rule(&h, tenant, "left", "split").await;
    add_rule(&h, tenant, "right", "split").await;
    let join = add_rule(&h, tenant, "join", "joined").await;

    let root = as_tenant(
        tenant,
        h.trigger
            .trigger_rule(&start, TriggerSource::Manual, serde_json::json!({}), Default::default()),
    )
    .await
    .unwrap();
    h.drain().await;

    let join_runs = runs_of(&h, &join).await;
    assert_eq!(statuses(&join_runs), vec![RuleRunStatus::Completed, RuleRunStatus::Skipped]);
    for run in join_runs.iter().filter(|run| run.status == RuleRunStatus::Completed) {
        assert_eq!(run.chain.root_run_id, Some(root.id));
    }

    // A second manual trigger is a new cascade.
    as_tenant(
        tenant,
        h.trigger
            .trigger_rule(&start, TriggerSource::Manual, serde_json::json!({}), Default::default()),
    )
    .await
    .unwrap();
    h.drain().await;
    let completed = runs_of(&h, &join)
        .await
        .into_iter()
        .filter(|run| run.status == RuleRunStatus::Completed)
        .count();
    assert_eq!(completed, 2);
}

#[tokio::test]
async fn test_events_of_one_run_share_claimed_rules() {
    let h = Harness::builder()
        .action_executor(
            ScriptedActionExecutor::default()
                .emit("source", "changed")
                .emit("source", "changed")
                .emit("source", "audited"),
        )
        .build()
        .await;
    let tenant = Uuid::new_v4();
    add_rule(&h, tenant, "source", "start").await;
    let listener = add_rule(&h, tenant, "listener", "changed").await;
    let auditor = add_rule(&h, tenant, "auditor", "audited").await;

    emit(&h, DomainEvent::new(tenant, "start")).await;
    let job = h.dispatcher.take().remove(0);
    let report = h.run(job).await.unwrap();
    assert_eq!(report, JobReport::AutomationRun(RunOutcome::Completed { follow_up_runs: 2 }));

    let listener_runs = runs_of(&h, &listener).await;
    assert_eq!(listener_runs.len(), 1, "the repeated event must not queue the rule twice");
    let auditor_runs = runs_of(&h, &auditor).await;
    assert_eq!(auditor_runs.len(), 1);
    assert!(auditor_runs[0].chain.executed_rule_ids.contains(&listener.id));

    h.drain().await;
    let mut executed = h.action_executor.executed_rules();
    executed.sort();
    assert_eq!(executed, vec!["auditor", "listener", "source"]);
}

/// Rule store whose execution stamp always fails.
struct LockedRuleStore(SqliteAutomationRuleRepository);

#[async_trait]
impl AutomationRuleRepository for LockedRuleStore {
    async fn create(&self, rule: &AutomationRule) -> DomainResult<()> {
        self.0.create(rule).await
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<Option<AutomationRule>> {
        self.0.get(tenant_id, id).await
    }

    async fn update(&self, rule: &AutomationRule) -> DomainResult<()> {
        self.0.update(rule).await
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> DomainResult<()> {
        self.0.delete(tenant_id, id).await
    }

    async fn list(&self, tenant_id: Uuid) -> DomainResult<Vec<AutomationRule>> {
        self.0.list(tenant_id).await
    }

    async fn list_enabled_for_event(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> DomainResult<Vec<AutomationRule>> {
        self.0.list_enabled_for_event(tenant_id, event_type).await
    }

    async fn list_enabled_scheduled(&self) -> DomainResult<Vec<AutomationRule>> {
        self.0.list_enabled_scheduled().await
    }

    async fn claim_schedule_minute(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
        minute_start: DateTime<Utc>,
    ) -> DomainResult<bool> {
        self.0.claim_schedule_minute(tenant_id, id, now, minute_start).await
    }

    async fn record_execution(&self, _tenant_id: Uuid, _id: Uuid, _now: DateTime<Utc>) -> DomainResult<()> {
        Err(DomainError::DatabaseError("database is locked".to_string()))
    }
}

#[tokio::test]
async fn test_store_error_after_start_marks_run_failed() {
    let h = Harness::new().await;
    let tenant = Uuid::new_v4();
    let rule = add_rule(&h, tenant, "stamped", "note.created").await;
    let run = emit(&h, DomainEvent::new(tenant, "note.created")).await.remove(0);

    let executor = AutomationRunExecutor::new(
        Arc::new(LockedRuleStore(SqliteAutomationRuleRepository::new(h.pool.clone()))),
        h.rule_runs.clone(),
        h.action_executor.clone(),
        h.trigger.clone(),
    );

    let outcome = as_tenant(tenant, executor.execute(run.id)).await.unwrap();
    assert!(matches!(&outcome, RunOutcome::Failed { error } if error.contains("database is locked")));

    let stored = &runs_of(&h, &rule).await[0];
    assert_eq!(stored.status, RuleRunStatus::Failed);
    assert!(stored.completed_at.is_some());
    assert!(h.action_executor.executed_rules().is_empty());

    let again = as_tenant(tenant, executor.execute(run.id)).await.unwrap();
    assert_eq!(again, RunOutcome::AlreadyHandled { status: RuleRunStatus::Failed });
}
