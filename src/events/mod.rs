//! # Event System
//!
//! Lifecycle events flow through a single broadcast publisher as a closed
//! tagged union ([`CrawlEventKind`]); listeners subscribe and pattern-match
//! rather than overriding per-event hooks.

pub mod monitor;
pub mod publisher;
pub mod types;

pub use monitor::CrawlerMonitor;
pub use publisher::{EventPublisher, PublishError};
pub use types::{CrawlEvent, CrawlEventKind};

use std::sync::Arc;
use tracing::warn;

/// Publisher plus monitor, shared by every component that fires events.
#[derive(Debug, Clone)]
pub struct EventBus {
    publisher: EventPublisher,
    monitor: Arc<CrawlerMonitor>,
}

impl EventBus {
    pub fn new(publisher: EventPublisher, monitor: Arc<CrawlerMonitor>) -> Self {
        Self { publisher, monitor }
    }

    pub fn monitor(&self) -> &Arc<CrawlerMonitor> {
        &self.monitor
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Record and publish one event. Publishing failures are logged, never
    /// propagated: the event stream must not affect crawl outcomes.
    pub fn fire(&self, event: CrawlEvent) {
        self.monitor.record(&event);
        if let Err(e) = self.publisher.publish(event) {
            warn!("Could not publish crawl event: {e}");
        }
    }

    pub fn fire_kind(&self, kind: CrawlEventKind) {
        self.fire(CrawlEvent::new(kind));
    }

    pub fn fire_for(&self, kind: CrawlEventKind, reference: impl Into<String>) {
        self.fire(CrawlEvent::for_reference(kind, reference));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventPublisher::default(), Arc::new(CrawlerMonitor::new()))
    }
}
