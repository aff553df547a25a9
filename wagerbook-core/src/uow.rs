//! Atomic scope for one operation.
//!
//! A [`UnitOfWork`] owns a storage transaction and the events staged while
//! it runs. Committing persists every write and then releases the events;
//! dropping it without committing throws both away.

use crate::config::{ConfigStore, EngineConfig};
use crate::error::EngineResult;
use crate::events::{Event, EventBus, StagedEvents};
use crate::ledger::Ledger;
use crate::storage::{SharedStore, StoreTx};
use crate::utils::clock::SharedClock;
use time::OffsetDateTime;

/// Everything an engine needs to start a unit of work.
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    store: SharedStore,
    bus: EventBus,
    clock: SharedClock,
    config: ConfigStore<EngineConfig>,
}

impl UnitOfWorkFactory {
    pub fn new(
        store: SharedStore,
        bus: EventBus,
        clock: SharedClock,
        config: ConfigStore<EngineConfig>,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            config,
        }
    }

    /// Open a transaction and take a configuration snapshot for it.
    pub async fn begin(&self) -> EngineResult<UnitOfWork> {
        let tx = self.store.begin().await?;
        let config = self.config.snapshot().await;
        Ok(UnitOfWork {
            tx,
            events: StagedEvents::new(self.bus.clone()),
            now: self.clock.now(),
            config,
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config_store(&self) -> &ConfigStore<EngineConfig> {
        &self.config
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }
}

pub struct UnitOfWork {
    tx: Box<dyn StoreTx>,
    events: StagedEvents,
    now: OffsetDateTime,
    config: EngineConfig,
}

impl UnitOfWork {
    /// Clock reading taken when the unit of work began.
    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&mut self) -> Ledger<'_> {
        Ledger::new(
            self.tx.as_mut(),
            &mut self.events,
            self.now,
            self.config.starting_balance,
        )
    }

    /// Direct access to non-ledger rows (bets, wagers, votes, participants).
    pub fn store(&mut self) -> &mut dyn StoreTx {
        self.tx.as_mut()
    }

    pub fn publish(&mut self, event: Event) {
        self.events.publish(event);
    }

    pub fn staged_events(&self) -> usize {
        self.events.len()
    }

    /// Persist all writes, then release the staged events.
    ///
    /// On failure the transaction is gone and no event is delivered.
    pub async fn commit(self) -> EngineResult<()> {
        let UnitOfWork { tx, events, .. } = self;
        match tx.commit().await {
            Ok(()) => {
                events.flush();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Commit failed, discarding staged events");
                events.discard();
                Err(e.into())
            }
        }
    }

    pub async fn rollback(self) -> EngineResult<()> {
        let UnitOfWork { tx, events, .. } = self;
        events.discard();
        tx.rollback().await?;
        Ok(())
    }
}
