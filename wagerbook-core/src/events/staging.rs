use super::{Event, EventBus};

/// Events staged by one unit of work.
///
/// Nothing is visible to subscribers until [`StagedEvents::flush`]. Dropping
/// the stage without flushing discards everything.
pub struct StagedEvents {
    bus: EventBus,
    events: Vec<Event>,
}

impl StagedEvents {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            events: Vec::new(),
        }
    }

    pub fn publish(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand every staged event to the bus, in publish order.
    pub fn flush(self) {
        self.bus.dispatch(self.events);
    }

    pub fn discard(self) {
        if !self.events.is_empty() {
            tracing::debug!(count = self.events.len(), "Discarding staged events");
        }
    }
}
