//! Application layer: job runner and worker pool.

pub mod job_runner;
pub mod worker;

pub use job_runner::{JobError, JobReport, JobRunner, ERROR_REARM_DELAY};
pub use worker::{Worker, WorkerHandle};
