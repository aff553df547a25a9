//! Runtime configuration consumed by the engines.
//!
//! The server crate parses and validates the file format; these are the
//! already-validated values. They sit in a [`ConfigStore`] so that a reload
//! takes effect for every operation that starts afterwards.

mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use crate::entities::AccountId;

/// Hard bounds on the number of options a group wager may offer.
pub const OPTION_COUNT_FLOOR: usize = 2;
pub const OPTION_COUNT_CEILING: usize = 10;

/// Limits applied when a group wager is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupWagerLimits {
    pub min_options: usize,
    pub max_options: usize,
    pub min_voting_period: time::Duration,
    pub max_voting_period: time::Duration,
}

impl GroupWagerLimits {
    /// Configured option bounds, clamped into `[2, 10]`.
    pub fn option_bounds(&self) -> (usize, usize) {
        let min = self
            .min_options
            .clamp(OPTION_COUNT_FLOOR, OPTION_COUNT_CEILING);
        let max = self.max_options.clamp(min, OPTION_COUNT_CEILING);
        (min, max)
    }
}

impl Default for GroupWagerLimits {
    fn default() -> Self {
        Self {
            min_options: OPTION_COUNT_FLOOR,
            max_options: OPTION_COUNT_CEILING,
            min_voting_period: time::Duration::minutes(1),
            max_voting_period: time::Duration::days(7),
        }
    }
}

/// Everything the engines read from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Balance credited (as a `Grant` entry) when an account is first touched.
    pub starting_balance: i64,
    /// Maximum total solo-bet stake per account per daily window.
    pub daily_stake_cap: i64,
    /// UTC hour at which the daily window rolls over.
    pub daily_reset_hour: u8,
    /// Votes needed before a head-to-head majority can resolve the wager.
    ///
    /// A strict lead does not resolve on its own until this many votes are
    /// recorded. The default of 5 makes 3-2 the smallest deciding tally; set
    /// it to 1 to resolve on the first vote that leaves one side ahead.
    pub head_to_head_vote_quorum: u32,
    pub group_wager: GroupWagerLimits,
    /// Accounts allowed to resolve group wagers and adjust balances.
    pub resolvers: Vec<AccountId>,
    /// How often the expiration sweep runs.
    pub sweep_interval: std::time::Duration,
}

impl EngineConfig {
    pub fn is_resolver(&self, account: AccountId) -> bool {
        self.resolvers.contains(&account)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1_000,
            daily_stake_cap: 10_000,
            daily_reset_hour: 0,
            head_to_head_vote_quorum: 5,
            group_wager: GroupWagerLimits::default(),
            resolvers: Vec::new(),
            sweep_interval: std::time::Duration::from_secs(60),
        }
    }
}
