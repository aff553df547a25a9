use crate::entities::AccountId;
use rust_decimal::Decimal;

/// A solo probability bet. Finalized the moment it is created.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Bet {
    pub id: i64,
    pub account: AccountId,
    pub stake: i64,
    pub win_probability: Decimal,
    pub won: bool,
    pub payout: i64,
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBet {
    pub account: AccountId,
    pub stake: i64,
    pub win_probability: Decimal,
    pub won: bool,
    pub payout: i64,
    pub created_at: time::OffsetDateTime,
}
