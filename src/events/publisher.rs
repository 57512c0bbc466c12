use tokio::sync::broadcast;

use super::types::CrawlEvent;

/// High-throughput publisher for crawl lifecycle events.
///
/// Dispatch is synchronous into a broadcast channel; the core never blocks
/// on subscriber execution.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<CrawlEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: CrawlEvent) -> Result<(), PublishError> {
        // For broadcast channels, send() returns an error if there are no
        // subscribers. That is acceptable here - events are published whether
        // or not anyone is listening.
        match self.sender.send(event) {
            Ok(_) | Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000) // Default capacity of 1000 events
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
