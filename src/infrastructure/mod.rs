//! Infrastructure layer module
//!
//! Configuration loading and logging setup. Persistence and job transport
//! live under `adapters`.

pub mod config;
pub mod logging;
