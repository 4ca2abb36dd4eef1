//! Event Bus - pub/sub between the chat session and its UI
//!
//! The EventBus uses a tokio broadcast channel to deliver events to all
//! subscribers. The session emits; the chart, the chat panel and loggers
//! subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::ChatEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast bus for [`ChatEvent`]s
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
    channel_capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            channel_capacity: capacity.max(1),
        }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped. Slow
    /// subscribers lose the oldest events once the channel is full.
    pub fn emit(&self, event: ChatEvent) {
        debug!(
            event_type = event.event_type(),
            message_id = event.message_id().map(|id| id.as_str()),
            "EventBus::emit"
        );
        // No subscribers is OK
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.channel_capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
