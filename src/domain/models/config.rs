use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::automation_chain::{ChainLimits, MAX_CHAIN_DEPTH, MAX_RULES_PER_CHAIN};

/// Main configuration structure for the worker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Worker pool and periodic tick configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Per-agent task scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Automation chain limits
    #[serde(default)]
    pub automation: AutomationConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".collective/collective.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Number of concurrent job workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Seconds between cron sweeps (1-60)
    #[serde(default = "default_cron_interval_secs")]
    pub cron_interval_secs: u64,

    /// Seconds between cross-tenant stuck-task recovery sweeps
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,

    /// Days to keep finished agent task runs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

const fn default_concurrency() -> usize {
    4
}

const fn default_cron_interval_secs() -> u64 {
    60
}

const fn default_recovery_interval_secs() -> u64 {
    300
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            cron_interval_secs: default_cron_interval_secs(),
            recovery_interval_secs: default_recovery_interval_secs(),
            retention_days: default_retention_days(),
        }
    }
}

/// Per-agent task scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Seconds after which a running task is declared stuck
    #[serde(default = "default_stuck_timeout_secs")]
    pub stuck_timeout_secs: u64,

    /// Delay before a finished invocation re-arms the agent's queue
    #[serde(default)]
    pub rearm_delay_ms: u64,
}

const fn default_stuck_timeout_secs() -> u64 {
    15 * 60
}

impl SchedulerConfig {
    pub fn stuck_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.stuck_timeout_secs).unwrap_or(i64::MAX))
    }

    pub const fn rearm_delay(&self) -> Duration {
        Duration::from_millis(self.rearm_delay_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stuck_timeout_secs: default_stuck_timeout_secs(),
            rearm_delay_ms: 0,
        }
    }
}

/// Automation chain limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AutomationConfig {
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: u32,

    #[serde(default = "default_max_rules_per_chain")]
    pub max_rules_per_chain: usize,
}

const fn default_max_chain_depth() -> u32 {
    MAX_CHAIN_DEPTH
}

const fn default_max_rules_per_chain() -> usize {
    MAX_RULES_PER_CHAIN
}

impl AutomationConfig {
    pub const fn limits(&self) -> ChainLimits {
        ChainLimits {
            max_depth: self.max_chain_depth,
            max_rules: self.max_rules_per_chain,
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            max_rules_per_chain: default_max_rules_per_chain(),
        }
    }
}
