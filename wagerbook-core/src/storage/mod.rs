//! Transactional storage behind the ledger and the engines.
//!
//! A [`Store`] opens transactions; a [`StoreTx`] reads and writes rows and
//! either commits everything or nothing. The `lock_*` methods take a row
//! lock held until the transaction ends, which is how concurrent operations
//! on the same account or wager serialize.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::entities::{
    Account, AccountId, Bet, GroupWager, GroupWagerParticipant, LedgerEntry, NewBet,
    NewGroupWager, NewLedgerEntry, NewWager, VoteRecord, Wager,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("inconsistent row: {0}")]
    Inconsistent(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

pub type SharedStore = Arc<dyn Store>;

#[async_trait]
pub trait StoreTx: Send {
    // -- accounts and ledger ------------------------------------------------

    /// Lock the account row, creating it with `starting_balance` if missing.
    ///
    /// Returns the account and whether it was created by this call.
    async fn lock_or_open_account(
        &mut self,
        id: AccountId,
        starting_balance: i64,
        now: OffsetDateTime,
    ) -> Result<(Account, bool), StoreError>;

    async fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError>;

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// Newest first.
    async fn entries_for(
        &mut self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn entry_sum(&mut self, account: AccountId) -> Result<i64, StoreError>;

    /// Highest balance first, ties by ascending id.
    async fn top_accounts(&mut self, limit: i64) -> Result<Vec<Account>, StoreError>;

    // -- solo bets ----------------------------------------------------------

    async fn insert_bet(&mut self, bet: NewBet) -> Result<Bet, StoreError>;

    /// Sum of stakes placed by `account` at or after `since`.
    async fn staked_since(
        &mut self,
        account: AccountId,
        since: OffsetDateTime,
    ) -> Result<i64, StoreError>;

    // -- head-to-head wagers ------------------------------------------------

    async fn insert_wager(&mut self, wager: NewWager) -> Result<Wager, StoreError>;

    async fn get_wager(&mut self, id: i64) -> Result<Option<Wager>, StoreError>;

    async fn lock_wager(&mut self, id: i64) -> Result<Option<Wager>, StoreError>;

    async fn update_wager(&mut self, wager: &Wager) -> Result<(), StoreError>;

    /// Insert or overwrite the vote of `vote.voter` on `vote.wager_id`.
    async fn upsert_vote(&mut self, vote: &VoteRecord) -> Result<(), StoreError>;

    async fn votes_for(&mut self, wager_id: i64) -> Result<Vec<VoteRecord>, StoreError>;

    // -- group wagers -------------------------------------------------------

    async fn insert_group_wager(&mut self, wager: NewGroupWager)
    -> Result<GroupWager, StoreError>;

    async fn get_group_wager(&mut self, id: i64) -> Result<Option<GroupWager>, StoreError>;

    async fn lock_group_wager(&mut self, id: i64) -> Result<Option<GroupWager>, StoreError>;

    /// Persist state, winner, close stamp, message reference and option totals.
    async fn update_group_wager(&mut self, wager: &GroupWager) -> Result<(), StoreError>;

    async fn get_participant(
        &mut self,
        group_wager_id: i64,
        account: AccountId,
    ) -> Result<Option<GroupWagerParticipant>, StoreError>;

    async fn upsert_participant(
        &mut self,
        participant: &GroupWagerParticipant,
    ) -> Result<(), StoreError>;

    /// Ordered by account id.
    async fn participants_for(
        &mut self,
        group_wager_id: i64,
    ) -> Result<Vec<GroupWagerParticipant>, StoreError>;

    async fn active_group_wagers(&mut self) -> Result<Vec<GroupWager>, StoreError>;

    /// Ids of active wagers past their deadline that the sweep has not closed.
    async fn expired_open_group_wagers(
        &mut self,
        now: OffsetDateTime,
    ) -> Result<Vec<i64>, StoreError>;

    // -- transaction --------------------------------------------------------

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
