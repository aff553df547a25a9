//! Bounded fan-out of committed events to subscribers.

use super::{Event, EventKind};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Default buffer size for each subscriber queue.
///
/// A subscriber that falls this far behind starts losing events.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender half of a subscriber queue.
pub type SubscriberQueueSender = mpsc::Sender<Event>;
/// Receiver half of a subscriber queue.
pub type SubscriberQueueReceiver = mpsc::Receiver<Event>;

/// A consumer of committed events.
///
/// `handle` runs in its own task per delivery; an error or a panic is
/// logged and the next event is delivered as usual.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn interested_in(&self, kind: EventKind) -> bool;

    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

pub type SharedSubscriber = Arc<dyn Subscriber>;

struct Route {
    subscriber: SharedSubscriber,
    sender: SubscriberQueueSender,
}

#[derive(Clone, Default)]
pub struct EventBus {
    routes: Arc<RwLock<Vec<Route>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and spawn its worker.
    ///
    /// The worker exits once the bus is closed and its queue drained.
    pub fn subscribe(&self, subscriber: SharedSubscriber) -> JoinHandle<()> {
        let (sender, receiver) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        {
            let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
            routes.push(Route {
                subscriber: subscriber.clone(),
                sender,
            });
        }
        tracing::debug!(subscriber = subscriber.name(), "Subscriber registered");
        tokio::spawn(run_worker(subscriber, receiver))
    }

    pub fn subscriber_count(&self) -> usize {
        self.routes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Queue events for every interested subscriber without waiting.
    pub fn dispatch(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        for event in events {
            let kind = event.kind();
            for route in routes.iter() {
                if !route.subscriber.interested_in(kind) {
                    continue;
                }
                match route.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscriber = route.subscriber.name(),
                            event = %kind,
                            "Subscriber queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::warn!(
                            subscriber = route.subscriber.name(),
                            event = %kind,
                            "Subscriber worker is gone, dropping event"
                        );
                    }
                }
            }
        }
    }

    /// Drop every queue sender so the workers drain and exit.
    pub fn close(&self) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.clear();
    }
}

async fn run_worker(subscriber: SharedSubscriber, mut receiver: SubscriberQueueReceiver) {
    let name = subscriber.name();
    tracing::info!(subscriber = name, "Subscriber worker started");

    while let Some(event) = receiver.recv().await {
        let kind = event.kind();
        let delivery = {
            let subscriber = subscriber.clone();
            tokio::spawn(async move { subscriber.handle(event).await })
        };
        match delivery.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(subscriber = name, event = %kind, error = %e, "Event delivery failed");
            }
            Err(e) if e.is_panic() => {
                tracing::error!(subscriber = name, event = %kind, "Subscriber panicked while handling event");
            }
            Err(e) => {
                tracing::warn!(subscriber = name, event = %kind, error = %e, "Event delivery was cancelled");
            }
        }
    }

    tracing::info!(subscriber = name, "Subscriber worker stopped");
}
