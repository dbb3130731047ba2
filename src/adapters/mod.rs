//! Adapters: SQLite persistence, job dispatch, default executors.

pub mod executors;
pub mod jobs;
pub mod sqlite;
