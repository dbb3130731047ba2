use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Default project directory holding config files and the database.
pub const CONFIG_DIR: &str = ".collective";

/// Prefix for environment overrides; nested keys use `__`.
pub const ENV_PREFIX: &str = "COLLECTIVE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid worker concurrency: {0}. Must be at least 1")]
    InvalidConcurrency(usize),

    #[error("Invalid cron_interval_secs: {0}. Must be between 1 and 60")]
    InvalidCronInterval(u64),

    #[error("Invalid stuck_timeout_secs: {0}. Must be positive")]
    InvalidStuckTimeout(u64),

    #[error("Invalid chain limits: max_chain_depth ({depth}) and max_rules_per_chain ({rules}) must be positive, with rules >= depth")]
    InvalidChainLimits { depth: u32, rules: usize },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .collective/config.yaml (project config)
    /// 3. .collective/local.yaml (local overrides, optional)
    /// 4. Environment variables (COLLECTIVE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same merge order as [`ConfigLoader::load`], rooted at `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Self::figment(dir.as_ref())
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(dir: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if config.worker.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(config.worker.concurrency));
        }
        if !(1..=60).contains(&config.worker.cron_interval_secs) {
            return Err(ConfigError::InvalidCronInterval(config.worker.cron_interval_secs));
        }
        if config.worker.recovery_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "recovery_interval_secs must be positive".to_string(),
            ));
        }

        if config.scheduler.stuck_timeout_secs == 0 {
            return Err(ConfigError::InvalidStuckTimeout(config.scheduler.stuck_timeout_secs));
        }

        let depth = config.automation.max_chain_depth;
        let rules = config.automation.max_rules_per_chain;
        if depth == 0 || rules == 0 || rules < depth as usize {
            return Err(ConfigError::InvalidChainLimits { depth, rules });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".collective/collective.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.scheduler.stuck_timeout_secs, 900);
        assert_eq!(config.automation.max_chain_depth, 3);
        assert_eq!(config.automation.max_rules_per_chain, 10);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /var/lib/collective.db
  max_connections: 8
logging:
  level: debug
  format: pretty
worker:
  concurrency: 16
  cron_interval_secs: 30
scheduler:
  stuck_timeout_secs: 600
automation:
  max_chain_depth: 4
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/var/lib/collective.db");
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.worker.concurrency, 16);
        assert_eq!(config.worker.retention_days, 30);
        assert_eq!(config.scheduler.stuck_timeout().num_minutes(), 10);
        assert_eq!(config.automation.max_chain_depth, 4);
        assert_eq!(config.automation.max_rules_per_chain, 10);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_validate_cron_interval_bounds() {
        let mut config = Config::default();
        config.worker.cron_interval_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidCronInterval(0))
        ));
        config.worker.cron_interval_secs = 61;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_chain_limits() {
        let mut config = Config::default();
        config.automation.max_rules_per_chain = 2;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidChainLimits { depth: 3, rules: 2 })
        ));

        config.automation.max_rules_per_chain = 10;
        config.automation.max_chain_depth = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_zero_concurrency_and_timeout() {
        let mut config = Config::default();
        config.worker.concurrency = 0;
        assert!(ConfigLoader::validate(&config).is_err());

        let mut config = Config::default();
        config.scheduler.stuck_timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidStuckTimeout(0))
        ));
    }

    #[test]
    fn test_hierarchical_merging_and_env_override() {
        let dir = tempfile::tempdir().unwrap();

        let mut base = std::fs::File::create(dir.path().join("config.yaml")).unwrap();
        writeln!(base, "worker:\n  concurrency: 2\nlogging:\n  level: info\n  format: json").unwrap();
        let mut local = std::fs::File::create(dir.path().join("local.yaml")).unwrap();
        writeln!(local, "worker:\n  concurrency: 6\nlogging:\n  level: debug").unwrap();

        temp_env::with_vars(
            [
                ("COLLECTIVE_LOGGING__LEVEL", Some("warn")),
                ("COLLECTIVE_SCHEDULER__STUCK_TIMEOUT_SECS", Some("120")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
                assert_eq!(config.worker.concurrency, 6, "local.yaml should win over config.yaml");
                assert_eq!(config.logging.level, "warn", "environment should win over files");
                assert_eq!(config.logging.format, "json", "base value should persist");
                assert_eq!(config.scheduler.stuck_timeout_secs, 120);
            },
        );
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "automation:\n  max_chain_depth: 5\n  max_rules_per_chain: 3").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("chain limits"));
    }
}
