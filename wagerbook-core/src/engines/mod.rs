//! Operation handlers.
//!
//! Each engine accepts typed commands through
//! [`kanau::processor::Processor`], runs each command in its own
//! [`UnitOfWork`](crate::uow::UnitOfWork) and returns a typed result.
//! Validation and state checks happen before the first ledger write, and
//! any error leaves storage and subscribers untouched.

pub mod accounts;
pub mod betting;
pub mod group_wager;
pub mod head_to_head;

pub use accounts::{
    AccountService, GetBalance, Grant, LedgerAudit, LedgerHistory, Leaderboard, Transfer,
    TransferReceipt, VerifyLedger,
};
pub use betting::{BetOutcome, BettingEngine, CheckDailyLimit, DailyLimitStatus, PlaceBet};
pub use group_wager::{
    AttachMessage, CancelGroupWager, CreateGroupWager, GetGroupWager, GroupStakeReceipt,
    GroupWagerEngine, GroupWagerSettlement, GroupWagerView, ListActiveGroupWagers,
    ParticipantPayout, PlaceGroupBet, ResolveGroupWager, TransitionExpiredWagers,
};
pub use head_to_head::{
    CancelWager, CastVote, GetWager, HeadToHeadEngine, ProposeWager, RespondToWager,
    VoteOutcome, WagerSettlement, WagerView,
};
