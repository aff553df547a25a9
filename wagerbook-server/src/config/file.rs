//! TOML file configuration structures.
//!
//! These structs map one-to-one onto `wagerbook-config.toml`. Every key has
//! a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub engine: EngineSection,
    pub group_wager: GroupWagerSection,
    pub sweeper: SweeperSection,
    pub database: DatabaseSection,
}

/// Balances, solo-bet limits and the admin allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Credited to an account the first time it is touched.
    pub starting_balance: i64,
    /// Total solo-bet stake allowed per account per day.
    pub daily_stake_cap: i64,
    /// UTC hour (0-23) at which the daily window rolls over.
    pub daily_reset_hour: u8,
    /// Votes needed before a head-to-head majority resolves the wager.
    pub head_to_head_vote_quorum: u32,
    /// Account ids allowed to resolve group wagers and adjust balances.
    pub resolvers: Vec<i64>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            starting_balance: 1_000,
            daily_stake_cap: 10_000,
            daily_reset_hour: 0,
            head_to_head_vote_quorum: 5,
            resolvers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupWagerSection {
    pub min_options: usize,
    pub max_options: usize,
    pub min_voting_period_secs: u64,
    pub max_voting_period_secs: u64,
}

impl Default for GroupWagerSection {
    fn default() -> Self {
        Self {
            min_options: 2,
            max_options: 10,
            min_voting_period_secs: 60,
            max_voting_period_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSection {
    /// Seconds between expiration sweeps.
    pub interval_secs: u64,
}

impl Default for SweeperSection {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Postgres pool settings. The URL itself comes from `DATABASE_URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { max_connections: 10 }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[engine]
starting_balance = 500
daily_stake_cap = 2000
daily_reset_hour = 6
head_to_head_vote_quorum = 3
resolvers = [42, 77]

[group_wager]
min_options = 3
max_options = 6
min_voting_period_secs = 300
max_voting_period_secs = 86400

[sweeper]
interval_secs = 15

[database]
max_connections = 4
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.starting_balance, 500);
        assert_eq!(config.engine.daily_reset_hour, 6);
        assert_eq!(config.engine.resolvers, vec![42, 77]);
        assert_eq!(config.group_wager.max_options, 6);
        assert_eq!(config.sweeper.interval_secs, 15);
        assert_eq!(config.database.max_connections, 4);
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config: FileConfig = toml::from_str("[engine]\ndaily_stake_cap = 50\n").unwrap();
        assert_eq!(config.engine.daily_stake_cap, 50);
        assert_eq!(config.engine.starting_balance, 1_000);
        assert_eq!(config.engine.head_to_head_vote_quorum, 5);
        assert_eq!(config.group_wager.min_options, 2);
        assert_eq!(config.sweeper.interval_secs, 60);

        let empty: FileConfig = toml::from_str("").unwrap();
        assert!(empty.engine.resolvers.is_empty());
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("[engine]\ndaily_reset_hour = \"noon\"\n");
        assert!(result.is_err());
    }
}
