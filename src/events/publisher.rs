use serde_json::Value;
use tokio::sync::broadcast;

use crate::constants::defaults;

/// Fan-out publisher for orchestration lifecycle events.
///
/// Wraps a bounded broadcast channel: every subscriber receives every event
/// published after it subscribed, and slow subscribers lag rather than block
/// the publisher.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// A single event on the bus.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedEvent {
    /// Read a string field out of the event context, if present.
    pub fn context_str(&self, field: &str) -> Option<&str> {
        self.context.get(field).and_then(Value::as_str)
    }
}

impl EventPublisher {
    /// Create a publisher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a publisher sized by configuration.
    pub fn from_config(config: &crate::config::EventConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Publish an event with the given name and JSON context.
    ///
    /// Publishing with no active subscribers is not an error: lifecycle events
    /// are fire-and-forget and the bus drops them when nobody is listening.
    pub fn publish(&self, event_name: impl Into<String>, context: Value) -> Result<(), PublishError> {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        match self.sender.send(event) {
            Ok(_) => Ok(()),
            // send() errors only when there are no subscribers
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}
