use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current odds of one group wager option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionOdds {
    pub option_id: i64,
    pub text: String,
    pub total_staked: i64,
    /// `total_pot / total_staked`; `None` while nobody has staked on the option.
    pub multiplier: Option<Decimal>,
}

impl OptionOdds {
    /// Multiplier rounded to two places for display, e.g. `"2.50x"`.
    pub fn display_multiplier(&self) -> String {
        match self.multiplier {
            Some(m) => format!("{:.2}x", m.round_dp(2)),
            None => "-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_multiplier() {
        let odds = OptionOdds {
            option_id: 1,
            text: "Yes".to_string(),
            total_staked: 120,
            multiplier: Some(Decimal::new(25, 1)),
        };
        assert_eq!(odds.display_multiplier(), "2.50x");

        let empty = OptionOdds {
            multiplier: None,
            ..odds
        };
        assert_eq!(empty.display_multiplier(), "-");
    }
}
