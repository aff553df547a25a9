//! Shared fixtures for engine tests.

#![allow(clippy::unwrap_used)]

use crate::config::{ConfigStore, EngineConfig};
use crate::engines::{AccountService, BettingEngine, GroupWagerEngine, HeadToHeadEngine};
use crate::entities::{AccountBalance, AccountId};
use crate::events::{Event, EventBus, EventKind, Subscriber};
use crate::storage::{MemoryStore, Store};
use crate::uow::UnitOfWorkFactory;
use crate::utils::clock::ManualClock;
use crate::utils::outcome::OutcomeSource;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio::sync::mpsc;

pub const RESOLVER: AccountId = AccountId(900);

/// 2024-03-10 12:00:00 UTC.
pub fn start_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_710_072_000).unwrap()
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        starting_balance: 1000,
        daily_stake_cap: 10_000,
        resolvers: vec![RESOLVER],
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub bus: EventBus,
    pub clock: Arc<ManualClock>,
    pub config: ConfigStore<EngineConfig>,
    pub uow: UnitOfWorkFactory,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = MemoryStore::new();
        let bus = EventBus::new();
        let clock = Arc::new(ManualClock::new(start_time()));
        let config = ConfigStore::new(config);
        let uow = UnitOfWorkFactory::new(
            Arc::new(store.clone()),
            bus.clone(),
            clock.clone(),
            config.clone(),
        );
        Self {
            store,
            bus,
            clock,
            config,
            uow,
        }
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.uow.clone())
    }

    pub fn betting(&self, outcomes: ScriptedOutcomes) -> BettingEngine {
        BettingEngine::new(self.uow.clone(), Arc::new(outcomes))
    }

    pub fn head_to_head(&self) -> HeadToHeadEngine {
        HeadToHeadEngine::new(self.uow.clone())
    }

    pub fn group_wagers(&self) -> GroupWagerEngine {
        GroupWagerEngine::new(self.uow.clone())
    }

    /// Committed balance, or `None` if the account was never opened.
    pub async fn balance(&self, id: AccountId) -> Option<AccountBalance> {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_account(id).await.unwrap().map(|a| a.view())
    }

    /// Committed balance and ledger replay must agree.
    pub async fn assert_replays(&self, id: AccountId) {
        let mut tx = self.store.begin().await.unwrap();
        let account = tx.get_account(id).await.unwrap().unwrap();
        assert_eq!(tx.entry_sum(id).await.unwrap(), account.balance);
        assert!(account.available() >= 0);
        assert!(account.reserved >= 0);
    }
}

/// Rolls taken from a script, then a fixed fallback.
pub struct ScriptedOutcomes {
    rolls: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl ScriptedOutcomes {
    pub fn new(rolls: &[f64], fallback: f64) -> Self {
        Self {
            rolls: Mutex::new(rolls.iter().copied().collect()),
            fallback,
        }
    }

    /// Every bet with probability below one loses.
    pub fn always_lose() -> Self {
        Self::new(&[], 0.999_999)
    }

    pub fn always_win() -> Self {
        Self::new(&[], 0.0)
    }
}

impl OutcomeSource for ScriptedOutcomes {
    fn roll(&self) -> f64 {
        self.rolls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// Forwards every delivered event to a test-owned channel.
pub struct RecordingSubscriber {
    kinds: Option<Vec<EventKind>>,
    sender: mpsc::UnboundedSender<Event>,
}

impl RecordingSubscriber {
    pub fn all() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                kinds: None,
                sender,
            },
            receiver,
        )
    }

    pub fn only(kinds: &[EventKind]) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                kinds: Some(kinds.to_vec()),
                sender,
            },
            receiver,
        )
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn interested_in(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }

    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        self.sender.send(event)?;
        Ok(())
    }
}
