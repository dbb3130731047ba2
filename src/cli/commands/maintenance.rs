//! One-shot system sweeps: cron evaluation and stuck-task recovery.
//!
//! Each sweep runs as a system job through the job runner, then the jobs
//! it enqueued (rule runs, agent queue kicks) are run in this process.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::application::JobReport;
use crate::cli::output::{output, CommandOutput};
use crate::cli::runtime::Runtime;
use crate::domain::models::Config;
use crate::domain::ports::Job;

#[derive(Debug, Serialize)]
pub struct SweepOutput {
    pub evaluated: usize,
    pub fired: usize,
    pub already_fired: usize,
    pub invalid: usize,
    pub errors: usize,
    pub jobs_run: usize,
}

impl CommandOutput for SweepOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Evaluated {} scheduled rule(s): {} fired, {} already fired this minute",
            self.evaluated, self.fired, self.already_fired
        )];
        if self.invalid > 0 {
            lines.push(format!("{} rule(s) have invalid cron expressions", self.invalid));
        }
        if self.errors > 0 {
            lines.push(format!("{} rule(s) failed to fire, see logs", self.errors));
        }
        lines.push(format!("Ran {} follow-up job(s)", self.jobs_run));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct RecoverOutput {
    pub agents_kicked: usize,
    pub jobs_run: usize,
}

impl CommandOutput for RecoverOutput {
    fn to_human(&self) -> String {
        format!(
            "Restarted {} agent queue(s) with stuck tasks; ran {} job(s)",
            self.agents_kicked, self.jobs_run
        )
    }
}

pub async fn sweep(config: Config, json_mode: bool) -> Result<()> {
    let (runtime, mut receiver) = Runtime::open(config).await?;
    let report = match runtime.runner.run(Job::CronSweep).await? {
        JobReport::CronSweep(report) => report,
        other => return Err(anyhow!("unexpected report from cron sweep: {other:?}")),
    };
    let jobs_run = runtime.drain(&mut receiver).await;

    output(
        &SweepOutput {
            evaluated: report.evaluated,
            fired: report.fired.len(),
            already_fired: report.already_fired,
            invalid: report.invalid,
            errors: report.errors,
            jobs_run,
        },
        json_mode,
    );
    Ok(())
}

pub async fn recover(config: Config, json_mode: bool) -> Result<()> {
    let (runtime, mut receiver) = Runtime::open(config).await?;
    let report = match runtime.runner.run(Job::RecoverStuckTasks).await? {
        JobReport::Recovery(report) => report,
        other => return Err(anyhow!("unexpected report from recovery sweep: {other:?}")),
    };
    let jobs_run = runtime.drain(&mut receiver).await;

    output(
        &RecoverOutput {
            agents_kicked: report.agents_kicked,
            jobs_run,
        },
        json_mode,
    );
    Ok(())
}
