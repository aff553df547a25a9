//! ExpirationSweeper processor.
//!
//! Periodically runs [`TransitionExpiredWagers`] so group wagers stop
//! accepting stakes once their deadline has passed. Each sweep runs in its
//! own task and always completes; shutdown is only observed between sweeps.

use crate::config::{ConfigStore, ConfigWatcher, EngineConfig};
use crate::engines::{GroupWagerEngine, TransitionExpiredWagers};
use kanau::processor::Processor;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

pub struct ExpirationSweeper {
    engine: GroupWagerEngine,
}

fn ticker(period: Duration, start: Instant) -> Interval {
    let mut ticker = tokio::time::interval_at(start, period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl ExpirationSweeper {
    pub fn new(engine: GroupWagerEngine) -> Self {
        Self { engine }
    }

    /// Run until the shutdown signal fires.
    ///
    /// A configuration reload that changes `sweep_interval` restarts the
    /// schedule with the new period.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        config_store: ConfigStore<EngineConfig>,
        mut config_watcher: ConfigWatcher,
    ) {
        let mut period = config_store.read().await.sweep_interval;
        let mut schedule = ticker(period, Instant::now());
        info!(interval = ?period, "ExpirationSweeper started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("ExpirationSweeper received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    let new_period = config_store.read().await.sweep_interval;
                    if new_period != period {
                        info!(old = ?period, new = ?new_period, "Sweep interval changed");
                        period = new_period;
                        schedule = ticker(period, Instant::now() + period);
                    }
                }

                _ = schedule.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!("ExpirationSweeper shutdown complete");
    }

    async fn sweep(&self) {
        let engine = self.engine.clone();
        let handle = tokio::spawn(async move { engine.process(TransitionExpiredWagers).await });
        match handle.await {
            Ok(Ok(closed)) if closed.is_empty() => debug!("Sweep found nothing to close"),
            Ok(Ok(closed)) => info!(count = closed.len(), ids = ?closed, "Sweep closed voting"),
            Ok(Err(e)) => error!(error = %e, "Sweep failed"),
            Err(e) => error!(error = %e, "Sweep task panicked"),
        }
    }
}
