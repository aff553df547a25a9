pub mod clock;
pub mod daily_window;
pub mod outcome;
pub mod payout;
