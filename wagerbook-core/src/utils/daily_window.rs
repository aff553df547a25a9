use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// Returns the start of the daily stake window containing `now`.
///
/// The window rolls over at `reset_hour:00` UTC; an hour above 23 is treated
/// as 23.
pub fn last_reset_boundary(now: OffsetDateTime, reset_hour: u8) -> OffsetDateTime {
    let now = now.to_offset(UtcOffset::UTC);
    let rollover = Time::from_hms(reset_hour.min(23), 0, 0).unwrap_or(Time::MIDNIGHT);
    let today = now.replace_time(rollover);
    if today <= now {
        today
    } else {
        today - Duration::days(1)
    }
}

/// Stake allowance left in the current daily window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAllowance {
    pub cap: i64,
    pub spent: i64,
    pub remaining: i64,
}

impl DailyAllowance {
    pub fn new(cap: i64, spent: i64) -> Self {
        Self {
            cap,
            spent,
            remaining: (cap - spent).max(0),
        }
    }

    pub fn permits(&self, stake: i64) -> bool {
        stake <= self.remaining
    }
}
