//! Payout arithmetic. All results are floored; fractional points are dust.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Winnings on a solo bet at fair odds: `floor(stake * (1 - p) / p)`.
///
/// Returns `None` when `p` is outside `(0, 1)` or the result overflows.
pub fn fair_odds_payout(stake: i64, win_probability: Decimal) -> Option<i64> {
    if win_probability <= Decimal::ZERO || win_probability >= Decimal::ONE {
        return None;
    }
    Decimal::from(stake)
        .checked_mul(Decimal::ONE - win_probability)?
        .checked_div(win_probability)?
        .floor()
        .to_i64()
}

/// A winner's share of the pot: `floor(amount * pot / winning_total)`.
pub fn pooled_payout(amount: i64, pot: i64, winning_total: i64) -> i64 {
    if winning_total <= 0 {
        return 0;
    }
    let share = i128::from(amount) * i128::from(pot) / i128::from(winning_total);
    i64::try_from(share).unwrap_or(i64::MAX)
}

/// `pot / option_total`, undefined while the option has no stake.
pub fn option_multiplier(pot: i64, option_total: i64) -> Option<Decimal> {
    if option_total <= 0 {
        return None;
    }
    Decimal::from(pot).checked_div(Decimal::from(option_total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fair_odds() {
        assert_eq!(fair_odds_payout(100, Decimal::new(5, 1)), Some(100));
        assert_eq!(fair_odds_payout(100, Decimal::new(25, 2)), Some(300));
        assert_eq!(fair_odds_payout(10, Decimal::new(3, 1)), Some(23));
        assert_eq!(fair_odds_payout(1, Decimal::new(9, 1)), Some(0));
        assert_eq!(fair_odds_payout(100, Decimal::ZERO), None);
        assert_eq!(fair_odds_payout(100, Decimal::ONE), None);
    }

    #[test]
    fn test_pooled_payout_floors() {
        assert_eq!(pooled_payout(100, 300, 100), 300);
        // 100 * 250 / 150 = 166.66..
        assert_eq!(pooled_payout(100, 250, 150), 166);
        assert_eq!(pooled_payout(50, 250, 150), 83);
        assert_eq!(pooled_payout(10, 100, 0), 0);
    }

    #[test]
    fn test_multiplier() {
        assert_eq!(option_multiplier(300, 100), Some(Decimal::from(3)));
        assert_eq!(option_multiplier(300, 0), None);
    }
}
