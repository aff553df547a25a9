//! Configuration module for wagerbook-server.
//!
//! Loads the TOML file, validates it and converts it into the
//! [`EngineConfig`] the core reads through its `ConfigStore`.

pub mod file;

use crate::config::file::FileConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wagerbook_core::config::{EngineConfig, GroupWagerLimits, OPTION_COUNT_CEILING, OPTION_COUNT_FLOOR};
use wagerbook_core::entities::AccountId;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Everything the host needs out of one load.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub engine: EngineConfig,
    pub max_connections: u32,
}

pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    /// Read, validate and convert the configuration file.
    ///
    /// A missing file is not an error: every key has a default.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?self.config_path, "Config file not found, using defaults");
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let engine = &config.engine;
    if engine.starting_balance < 0 {
        return Err(invalid("engine.starting_balance must not be negative"));
    }
    if engine.daily_stake_cap <= 0 {
        return Err(invalid("engine.daily_stake_cap must be positive"));
    }
    if engine.daily_reset_hour > 23 {
        return Err(invalid("engine.daily_reset_hour must be between 0 and 23"));
    }
    if engine.head_to_head_vote_quorum == 0 {
        return Err(invalid("engine.head_to_head_vote_quorum must be at least 1"));
    }

    let group = &config.group_wager;
    let options = OPTION_COUNT_FLOOR..=OPTION_COUNT_CEILING;
    if !options.contains(&group.min_options) || !options.contains(&group.max_options) {
        return Err(invalid(format!(
            "group_wager option counts must be between {OPTION_COUNT_FLOOR} and {OPTION_COUNT_CEILING}"
        )));
    }
    if group.min_options > group.max_options {
        return Err(invalid("group_wager.min_options exceeds max_options"));
    }
    if group.min_voting_period_secs == 0 {
        return Err(invalid("group_wager.min_voting_period_secs must be positive"));
    }
    if group.min_voting_period_secs > group.max_voting_period_secs {
        return Err(invalid(
            "group_wager.min_voting_period_secs exceeds max_voting_period_secs",
        ));
    }
    if i64::try_from(group.max_voting_period_secs).is_err() {
        return Err(invalid("group_wager.max_voting_period_secs is too large"));
    }

    if config.sweeper.interval_secs == 0 {
        return Err(invalid("sweeper.interval_secs must be positive"));
    }
    if config.database.max_connections == 0 {
        return Err(invalid("database.max_connections must be positive"));
    }
    Ok(())
}

fn seconds(secs: u64) -> time::Duration {
    time::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let FileConfig {
        engine,
        group_wager,
        sweeper,
        database,
    } = file_config;

    LoadedConfig {
        engine: EngineConfig {
            starting_balance: engine.starting_balance,
            daily_stake_cap: engine.daily_stake_cap,
            daily_reset_hour: engine.daily_reset_hour,
            head_to_head_vote_quorum: engine.head_to_head_vote_quorum,
            group_wager: GroupWagerLimits {
                min_options: group_wager.min_options,
                max_options: group_wager.max_options,
                min_voting_period: seconds(group_wager.min_voting_period_secs),
                max_voting_period: seconds(group_wager.max_voting_period_secs),
            },
            resolvers: engine.resolvers.into_iter().map(AccountId).collect(),
            sweep_interval: std::time::Duration::from_secs(sweeper.interval_secs),
        },
        max_connections: database.max_connections,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "wagerbook-{}-{}.toml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_converts_into_engine_config() {
        let path = write_config(
            "convert",
            r#"
[engine]
daily_reset_hour = 4
resolvers = [9]

[group_wager]
min_voting_period_secs = 120

[sweeper]
interval_secs = 30
"#,
        );
        let loaded = ConfigLoader::new(&path).load().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.engine.daily_reset_hour, 4);
        assert!(loaded.engine.is_resolver(AccountId(9)));
        assert_eq!(
            loaded.engine.group_wager.min_voting_period,
            time::Duration::minutes(2)
        );
        assert_eq!(
            loaded.engine.sweep_interval,
            std::time::Duration::from_secs(30)
        );
        assert_eq!(loaded.max_connections, 10);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let loader = ConfigLoader::new(std::env::temp_dir().join("wagerbook-does-not-exist.toml"));
        let loaded = loader.load().unwrap();
        assert_eq!(loaded.engine, EngineConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "[engine]\ndaily_reset_hour = 24\n",
            "[engine]\ndaily_stake_cap = 0\n",
            "[engine]\nhead_to_head_vote_quorum = 0\n",
            "[group_wager]\nmin_options = 1\n",
            "[group_wager]\nmax_options = 11\n",
            "[group_wager]\nmin_options = 5\nmax_options = 3\n",
            "[group_wager]\nmin_voting_period_secs = 900\nmax_voting_period_secs = 600\n",
            "[sweeper]\ninterval_secs = 0\n",
        ];
        for case in cases {
            let config: FileConfig = toml::from_str(case).unwrap();
            let err = validate(&config).unwrap_err();
            assert!(
                matches!(err, ConfigError::ValidationError(_)),
                "expected a validation error for {case:?}"
            );
        }
    }

    #[test]
    fn test_parse_error_is_reported() {
        let path = write_config("broken", "[engine\nstarting_balance = 1");
        let err = ConfigLoader::new(&path).load().unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
