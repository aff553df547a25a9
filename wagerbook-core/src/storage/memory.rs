//! In-process store used by tests and the `--in-memory` server mode.
//!
//! Committed rows live behind a std mutex that is never held across an
//! await point. Row locks are per-key tokio mutexes held by the transaction
//! until it commits or is dropped. Writes go to a per-transaction overlay
//! and become visible to others only on commit.

use super::{Store, StoreError, StoreTx};
use crate::entities::{
    Account, AccountId, Bet, GroupWager, GroupWagerOption, GroupWagerParticipant,
    GroupWagerState, LedgerEntry, NewBet, NewGroupWager, NewLedgerEntry, NewWager, VoteRecord,
    Wager, WagerState,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Account(AccountId),
    Wager(i64),
    GroupWager(i64),
}

#[derive(Debug, Default, Clone)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: Vec<LedgerEntry>,
    bets: Vec<Bet>,
    wagers: BTreeMap<i64, Wager>,
    votes: BTreeMap<(i64, AccountId), VoteRecord>,
    group_wagers: BTreeMap<i64, GroupWager>,
    participants: BTreeMap<(i64, AccountId), GroupWagerParticipant>,
}

impl Tables {
    fn absorb(&mut self, overlay: Tables) {
        self.accounts.extend(overlay.accounts);
        self.entries.extend(overlay.entries);
        self.bets.extend(overlay.bets);
        self.wagers.extend(overlay.wagers);
        self.votes.extend(overlay.votes);
        self.group_wagers.extend(overlay.group_wagers);
        self.participants.extend(overlay.participants);
    }
}

fn merged<K: Ord + Clone, V: Clone>(base: &BTreeMap<K, V>, overlay: &BTreeMap<K, V>) -> BTreeMap<K, V> {
    let mut out = base.clone();
    out.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

fn lookup<K: Ord, V: Clone>(base: &BTreeMap<K, V>, overlay: &BTreeMap<K, V>, key: &K) -> Option<V> {
    overlay.get(key).or_else(|| base.get(key)).cloned()
}

struct Inner {
    data: Mutex<Tables>,
    locks: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
    next_id: AtomicI64,
    fail_next_commit: AtomicBool,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                data: Mutex::new(Tables::default()),
                locks: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                fail_next_commit: AtomicBool::new(false),
            }),
        }
    }

    /// Make the next commit fail after all writes were staged.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            guards: Vec::new(),
            held: HashSet::new(),
            pending: Tables::default(),
        }))
    }
}

struct MemoryTx {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    held: HashSet<LockKey>,
    pending: Tables,
}

impl MemoryTx {
    async fn acquire(&mut self, key: LockKey) {
        if self.held.contains(&key) {
            return;
        }
        let mutex = {
            let mut locks = self.inner.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        self.guards.push(guard);
        self.held.insert(key);
    }

    fn read<R>(&self, f: impl FnOnce(&Tables, &Tables) -> R) -> R {
        let data = self.inner.data.lock().unwrap_or_else(|e| e.into_inner());
        f(&data, &self.pending)
    }

    fn next_id(&self) -> i64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_or_open_account(
        &mut self,
        id: AccountId,
        starting_balance: i64,
        now: OffsetDateTime,
    ) -> Result<(Account, bool), StoreError> {
        self.acquire(LockKey::Account(id)).await;
        if let Some(account) = self.read(|base, pending| lookup(&base.accounts, &pending.accounts, &id)) {
            return Ok((account, false));
        }
        let account = Account {
            id,
            balance: starting_balance,
            reserved: 0,
            created_at: now,
        };
        self.pending.accounts.insert(id, account.clone());
        Ok((account, true))
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.read(|base, pending| lookup(&base.accounts, &pending.accounts, &id)))
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.pending.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let entry = LedgerEntry {
            id: self.next_id(),
            account: entry.account,
            delta: entry.delta,
            resulting_balance: entry.resulting_balance,
            kind: entry.kind,
            created_at: entry.created_at,
        };
        self.pending.entries.push(entry.clone());
        Ok(entry)
    }

    async fn entries_for(
        &mut self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.read(|base, pending| {
            let mut entries: Vec<LedgerEntry> = base
                .entries
                .iter()
                .chain(pending.entries.iter())
                .filter(|e| e.account == account)
                .cloned()
                .collect();
            entries.sort_by(|a, b| b.id.cmp(&a.id));
            entries.truncate(limit);
            entries
        }))
    }

    async fn entry_sum(&mut self, account: AccountId) -> Result<i64, StoreError> {
        Ok(self.read(|base, pending| {
            base.entries
                .iter()
                .chain(pending.entries.iter())
                .filter(|e| e.account == account)
                .map(|e| e.delta)
                .sum()
        }))
    }

    async fn top_accounts(&mut self, limit: i64) -> Result<Vec<Account>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.read(|base, pending| {
            let mut accounts: Vec<Account> = merged(&base.accounts, &pending.accounts)
                .into_values()
                .collect();
            accounts.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.id.cmp(&b.id)));
            accounts.truncate(limit);
            accounts
        }))
    }

    async fn insert_bet(&mut self, bet: NewBet) -> Result<Bet, StoreError> {
        let bet = Bet {
            id: self.next_id(),
            account: bet.account,
            stake: bet.stake,
            win_probability: bet.win_probability,
            won: bet.won,
            payout: bet.payout,
            created_at: bet.created_at,
        };
        self.pending.bets.push(bet.clone());
        Ok(bet)
    }

    async fn staked_since(
        &mut self,
        account: AccountId,
        since: OffsetDateTime,
    ) -> Result<i64, StoreError> {
        Ok(self.read(|base, pending| {
            base.bets
                .iter()
                .chain(pending.bets.iter())
                .filter(|b| b.account == account && b.created_at >= since)
                .map(|b| b.stake)
                .sum()
        }))
    }

    async fn insert_wager(&mut self, wager: NewWager) -> Result<Wager, StoreError> {
        let wager = Wager {
            id: self.next_id(),
            proposer: wager.proposer,
            target: wager.target,
            stake: wager.stake,
            condition: wager.condition,
            state: WagerState::Proposed,
            winner: None,
            created_at: wager.created_at,
            updated_at: wager.created_at,
        };
        self.acquire(LockKey::Wager(wager.id)).await;
        self.pending.wagers.insert(wager.id, wager.clone());
        Ok(wager)
    }

    async fn get_wager(&mut self, id: i64) -> Result<Option<Wager>, StoreError> {
        Ok(self.read(|base, pending| lookup(&base.wagers, &pending.wagers, &id)))
    }

    async fn lock_wager(&mut self, id: i64) -> Result<Option<Wager>, StoreError> {
        self.acquire(LockKey::Wager(id)).await;
        self.get_wager(id).await
    }

    async fn update_wager(&mut self, wager: &Wager) -> Result<(), StoreError> {
        self.pending.wagers.insert(wager.id, wager.clone());
        Ok(())
    }

    async fn upsert_vote(&mut self, vote: &VoteRecord) -> Result<(), StoreError> {
        self.pending
            .votes
            .insert((vote.wager_id, vote.voter), vote.clone());
        Ok(())
    }

    async fn votes_for(&mut self, wager_id: i64) -> Result<Vec<VoteRecord>, StoreError> {
        Ok(self.read(|base, pending| {
            merged(&base.votes, &pending.votes)
                .into_values()
                .filter(|v| v.wager_id == wager_id)
                .collect()
        }))
    }

    async fn insert_group_wager(
        &mut self,
        wager: NewGroupWager,
    ) -> Result<GroupWager, StoreError> {
        let id = self.next_id();
        let options = wager
            .option_texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| GroupWagerOption {
                id: self.next_id(),
                group_wager_id: id,
                text,
                order: index as i32,
                total_staked: 0,
            })
            .collect();
        let wager = GroupWager {
            id,
            creator: wager.creator,
            condition: wager.condition,
            options,
            min_participants: wager.min_participants,
            voting_deadline: wager.voting_deadline,
            state: GroupWagerState::Active,
            winning_option: None,
            voting_closed_at: None,
            message_ref: None,
            created_at: wager.created_at,
        };
        self.acquire(LockKey::GroupWager(id)).await;
        self.pending.group_wagers.insert(id, wager.clone());
        Ok(wager)
    }

    async fn get_group_wager(&mut self, id: i64) -> Result<Option<GroupWager>, StoreError> {
        Ok(self.read(|base, pending| lookup(&base.group_wagers, &pending.group_wagers, &id)))
    }

    async fn lock_group_wager(&mut self, id: i64) -> Result<Option<GroupWager>, StoreError> {
        self.acquire(LockKey::GroupWager(id)).await;
        self.get_group_wager(id).await
    }

    async fn update_group_wager(&mut self, wager: &GroupWager) -> Result<(), StoreError> {
        self.pending.group_wagers.insert(wager.id, wager.clone());
        Ok(())
    }

    async fn get_participant(
        &mut self,
        group_wager_id: i64,
        account: AccountId,
    ) -> Result<Option<GroupWagerParticipant>, StoreError> {
        let key = (group_wager_id, account);
        Ok(self.read(|base, pending| lookup(&base.participants, &pending.participants, &key)))
    }

    async fn upsert_participant(
        &mut self,
        participant: &GroupWagerParticipant,
    ) -> Result<(), StoreError> {
        self.pending.participants.insert(
            (participant.group_wager_id, participant.account),
            participant.clone(),
        );
        Ok(())
    }

    async fn participants_for(
        &mut self,
        group_wager_id: i64,
    ) -> Result<Vec<GroupWagerParticipant>, StoreError> {
        Ok(self.read(|base, pending| {
            merged(&base.participants, &pending.participants)
                .into_values()
                .filter(|p| p.group_wager_id == group_wager_id)
                .collect()
        }))
    }

    async fn active_group_wagers(&mut self) -> Result<Vec<GroupWager>, StoreError> {
        Ok(self.read(|base, pending| {
            merged(&base.group_wagers, &pending.group_wagers)
                .into_values()
                .filter(|w| w.state == GroupWagerState::Active)
                .collect()
        }))
    }

    async fn expired_open_group_wagers(
        &mut self,
        now: OffsetDateTime,
    ) -> Result<Vec<i64>, StoreError> {
        Ok(self.read(|base, pending| {
            merged(&base.group_wagers, &pending.group_wagers)
                .into_values()
                .filter(|w| w.is_awaiting_close(now))
                .map(|w| w.id)
                .collect()
        }))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            inner,
            guards,
            pending,
            ..
        } = *self;
        if inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            drop(guards);
            return Err(StoreError::CommitFailed(
                "injected commit failure".to_string(),
            ));
        }
        {
            let mut data = inner.data.lock().unwrap_or_else(|e| e.into_inner());
            data.absorb(pending);
        }
        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
