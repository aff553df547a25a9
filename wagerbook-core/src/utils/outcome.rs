/// Uniform random source in `[0, 1)` used to decide solo bets.
pub trait OutcomeSource: Send + Sync {
    fn roll(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngOutcome;

impl OutcomeSource for ThreadRngOutcome {
    fn roll(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// A bet wins when the roll lands strictly below the win probability.
pub fn is_win(roll: f64, win_probability: f64) -> bool {
    roll < win_probability
}
