//! Event type definitions.
//!
//! Events describe something that already happened and was committed.
//! They carry enough data for a display refresh; anything more should be
//! re-read from storage.

use crate::entities::{AccountId, EntryKind, GroupWagerState, MessageRef, WagerState};

/// Routing key used by subscribers to declare interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BalanceChanged,
    WagerStateChanged,
    GroupWagerStateChanged,
    GroupWagerStaked,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::BalanceChanged => write!(f, "balance_changed"),
            EventKind::WagerStateChanged => write!(f, "wager_state_changed"),
            EventKind::GroupWagerStateChanged => write!(f, "group_wager_state_changed"),
            EventKind::GroupWagerStaked => write!(f, "group_wager_staked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One ledger entry was written for `account`.
    BalanceChanged {
        account: AccountId,
        delta: i64,
        balance: i64,
        available: i64,
        kind: EntryKind,
    },
    /// A head-to-head wager moved to `state`.
    WagerStateChanged {
        wager_id: i64,
        state: WagerState,
        winner: Option<AccountId>,
    },
    /// A group wager was created, closed for voting, resolved or cancelled.
    GroupWagerStateChanged {
        group_wager_id: i64,
        state: GroupWagerState,
        voting_closed: bool,
        message_ref: Option<MessageRef>,
    },
    /// A stake landed on a group wager; displays refresh the odds.
    GroupWagerStaked {
        group_wager_id: i64,
        option_id: i64,
        account: AccountId,
        total_pot: i64,
        message_ref: Option<MessageRef>,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BalanceChanged { .. } => EventKind::BalanceChanged,
            Event::WagerStateChanged { .. } => EventKind::WagerStateChanged,
            Event::GroupWagerStateChanged { .. } => EventKind::GroupWagerStateChanged,
            Event::GroupWagerStaked { .. } => EventKind::GroupWagerStaked,
        }
    }
}
