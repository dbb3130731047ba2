//! Database setup command.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::sqlite::{initialize_database, verify_connection, PoolConfig};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
pub struct MigrateOutput {
    pub success: bool,
    pub database: String,
}

impl CommandOutput for MigrateOutput {
    fn to_human(&self) -> String {
        format!("Database ready at {}", self.database)
    }
}

pub async fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let pool = initialize_database(&config.database.url(), Some(PoolConfig::from(&config.database)))
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database.path))?;
    verify_connection(&pool).await.context("Database did not answer after migrating")?;
    pool.close().await;

    output(
        &MigrateOutput {
            success: true,
            database: config.database.path.clone(),
        },
        json_mode,
    );
    Ok(())
}
