use clap::Parser;
use collective_worker::cli::commands::rule::RuleCommands;
use collective_worker::cli::commands::run::RunCommands;
use collective_worker::cli::commands::task::TaskCommands;
use collective_worker::cli::{Cli, Commands};
use uuid::Uuid;

const TENANT: &str = "550e8400-e29b-41d4-a716-446655440000";
const AGENT: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

#[test]
fn test_parse_task_enqueue() {
    let cli = Cli::try_parse_from([
        "collective-worker",
        "task",
        "enqueue",
        "--tenant",
        TENANT,
        "--agent",
        AGENT,
        "Summarize the standup notes",
    ])
    .unwrap();

    match cli.command {
        Commands::Task(args) => match args.command {
            TaskCommands::Enqueue {
                tenant,
                agent,
                description,
                no_run,
            } => {
                assert_eq!(tenant, Uuid::parse_str(TENANT).unwrap());
                assert_eq!(agent, Uuid::parse_str(AGENT).unwrap());
                assert_eq!(description, "Summarize the standup notes");
                assert!(!no_run);
            }
            _ => panic!("Wrong task command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_task_list_with_status() {
    let cli = Cli::try_parse_from([
        "collective-worker",
        "task",
        "list",
        "--tenant",
        TENANT,
        "--agent",
        AGENT,
        "-s",
        "failed",
    ])
    .unwrap();

    match cli.command {
        Commands::Task(args) => match args.command {
            TaskCommands::List { status, .. } => assert_eq!(status.as_deref(), Some("failed")),
            _ => panic!("Wrong task command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_rule_add_schedule_defaults() {
    let cli = Cli::try_parse_from([
        "collective-worker",
        "rule",
        "add-schedule",
        "--tenant",
        TENANT,
        "--name",
        "weekly digest",
        "--cron",
        "0 9 * * 1",
    ])
    .unwrap();

    match cli.command {
        Commands::Rule(args) => match args.command {
            RuleCommands::AddSchedule { rule, cron, timezone } => {
                assert_eq!(rule.name, "weekly digest");
                assert_eq!(rule.action, "log");
                assert!(rule.collective.is_none());
                assert!(rule.action_config.is_none());
                assert_eq!(cron, "0 9 * * 1");
                assert_eq!(timezone, "UTC");
            }
            _ => panic!("Wrong rule command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_rule_add_event_in_collective() {
    let cli = Cli::try_parse_from([
        "collective-worker",
        "rule",
        "add-event",
        "--tenant",
        TENANT,
        "--collective",
        AGENT,
        "--name",
        "notify",
        "--event-type",
        "decision.made",
        "--action",
        "webhook",
        "--action-config",
        r#"{"url":"https://example.invalid/hook"}"#,
    ])
    .unwrap();

    match cli.command {
        Commands::Rule(args) => match args.command {
            RuleCommands::AddEvent { rule, event_type } => {
                assert_eq!(event_type, "decision.made");
                assert_eq!(rule.collective, Some(Uuid::parse_str(AGENT).unwrap()));
                assert_eq!(rule.action, "webhook");
                assert!(rule.action_config.is_some());
            }
            _ => panic!("Wrong rule command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_run_list_and_global_json() {
    let cli = Cli::try_parse_from([
        "collective-worker",
        "run",
        "list",
        "--tenant",
        TENANT,
        "--json",
    ])
    .unwrap();

    assert!(cli.json);
    match cli.command {
        Commands::Run(args) => match args.command {
            RunCommands::List { rule, status, .. } => {
                assert!(rule.is_none());
                assert!(status.is_none());
            }
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_tenant_is_required() {
    let result = Cli::try_parse_from(["collective-worker", "rule", "list"]);
    assert!(result.is_err());
}

#[test]
fn test_invalid_uuid_rejected() {
    let result = Cli::try_parse_from(["collective-worker", "rule", "enable", "--tenant", TENANT, "not-a-uuid"]);
    assert!(result.is_err());
}

#[test]
fn test_parse_system_commands() {
    for (word, expected) in [("sweep", "Sweep"), ("recover", "Recover"), ("worker", "Worker"), ("migrate", "Migrate")] {
        let cli = Cli::try_parse_from(["collective-worker", word]).unwrap();
        assert_eq!(format!("{:?}", cli.command), expected);
    }
}
