//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::{rule::RuleArgs, run::RunArgs, task::TaskArgs};

#[derive(Parser, Debug)]
#[command(name = "collective-worker")]
#[command(about = "Multi-tenant background worker: agent task queues, automation rules, cron triggers", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Read configuration from this file instead of .collective/
    #[arg(short, long, global = true, env = "COLLECTIVE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and apply migrations
    Migrate,

    /// Run the worker pool until interrupted
    Worker,

    /// Evaluate scheduled rules for the current minute and run what fires
    Sweep,

    /// Force-fail stuck agent tasks and restart their queues
    Recover,

    /// Agent task queue commands
    Task(TaskArgs),

    /// Automation rule commands
    Rule(RuleArgs),

    /// Automation rule run commands
    Run(RunArgs),
}
