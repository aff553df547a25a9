pub mod account;
pub mod bet;
pub mod group_wager;
pub mod ledger_entry;
pub mod wager;

pub use account::{Account, AccountBalance, AccountId};
pub use bet::{Bet, NewBet};
pub use group_wager::{
    GroupWager, GroupWagerOption, GroupWagerParticipant, GroupWagerState, MessageRef,
    NewGroupWager,
};
pub use ledger_entry::{EntryKind, LedgerEntry, NewLedgerEntry};
pub use wager::{NewWager, VoteRecord, VoteTally, Wager, WagerState};
