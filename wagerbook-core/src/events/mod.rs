//! Post-commit notifications.
//!
//! Operations stage events on their unit of work ([`StagedEvents`]); the
//! events reach the [`EventBus`] only after the commit succeeded. The bus
//! fans each event out to every interested [`Subscriber`] through a bounded
//! per-subscriber queue, so a slow or failing subscriber never affects the
//! operation or the other subscribers.

pub mod bus;
pub mod staging;
pub mod types;

pub use bus::{
    DEFAULT_CHANNEL_BUFFER, EventBus, SharedSubscriber, Subscriber, SubscriberQueueReceiver,
    SubscriberQueueSender,
};
pub use staging::StagedEvents;
pub use types::{Event, EventKind};
