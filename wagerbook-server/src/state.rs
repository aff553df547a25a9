//! Engines and background services shared by the host.
//!
//! The host only drives what runs without a caller: the startup ledger audit,
//! the top-holder tracker and the group wager expiration sweep. The
//! `BettingEngine` (with a `ThreadRngOutcome`) and `HeadToHeadEngine` are
//! built by the embedding presentation layer from its own
//! `UnitOfWorkFactory` over the same store and bus.

use kanau::processor::Processor;
use std::sync::Arc;
use wagerbook_core::config::{ConfigStore, EngineConfig};
use wagerbook_core::engines::{AccountService, GroupWagerEngine, Leaderboard, VerifyLedger};
use wagerbook_core::events::EventBus;
use wagerbook_core::processors::{AuditLog, TopHolder, TopHolderTracker};
use wagerbook_core::storage::SharedStore;
use wagerbook_core::uow::UnitOfWorkFactory;
use wagerbook_core::utils::clock::SystemClock;

/// Number of leading accounts whose ledgers are replayed at startup.
const STARTUP_AUDIT_ACCOUNTS: i64 = 10;

/// Application state wired once at startup.
///
/// Cloneable and cheap to pass around; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: ConfigStore<EngineConfig>,
    pub bus: EventBus,
    pub accounts: AccountService,
    pub group_wagers: GroupWagerEngine,
    top_holder: Arc<TopHolderTracker>,
}

impl AppState {
    /// Build the engines and register the built-in subscribers on a fresh bus.
    pub fn new(store: SharedStore, config: ConfigStore<EngineConfig>) -> Self {
        let bus = EventBus::new();
        let uow = UnitOfWorkFactory::new(
            store.clone(),
            bus.clone(),
            Arc::new(SystemClock),
            config.clone(),
        );

        let (tracker, _holder_rx) = TopHolderTracker::new(store);
        let top_holder = Arc::new(tracker);
        bus.subscribe(Arc::new(AuditLog));
        bus.subscribe(top_holder.clone());
        tracing::info!(subscribers = bus.subscriber_count(), "Event subscribers registered");

        Self {
            config,
            bus,
            accounts: AccountService::new(uow.clone()),
            group_wagers: GroupWagerEngine::new(uow),
            top_holder,
        }
    }

    /// Seed the top-holder value before the first balance change arrives.
    pub async fn refresh_top_holder(&self) -> anyhow::Result<Option<TopHolder>> {
        self.top_holder.refresh().await
    }

    /// Replay the ledgers of the richest accounts and log any mismatch.
    ///
    /// Returns the number of inconsistent accounts found.
    pub async fn audit_leading_accounts(&self) -> anyhow::Result<usize> {
        let leaders = self
            .accounts
            .process(Leaderboard {
                limit: STARTUP_AUDIT_ACCOUNTS,
            })
            .await?;

        let mut inconsistent = 0;
        for leader in leaders {
            let audit = self
                .accounts
                .process(VerifyLedger {
                    account: leader.account,
                })
                .await?;
            if !audit.is_consistent() {
                inconsistent += 1;
            }
        }
        Ok(inconsistent)
    }
}
