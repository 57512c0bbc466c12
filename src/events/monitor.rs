use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{CrawlEvent, CrawlEventKind};

/// Live counters over the event stream, used for progress reporting and the
/// max-documents check.
///
/// The processed count is seeded with the ledger's persisted count when a
/// session resumes, so a configured document cap spans interrupted runs.
/// The queued count is cumulative over the session's lifetime; the backlog
/// at any instant is `queued - processed`.
#[derive(Debug, Default)]
pub struct CrawlerMonitor {
    processed_count: AtomicU64,
    queued_count: AtomicU64,
    event_counts: DashMap<&'static str, u64>,
}

impl CrawlerMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed counters from a prior session's persisted state: documents
    /// already finalized and references still waiting in the queue.
    pub fn seed(&self, processed: u64, backlog: u64) {
        self.processed_count.store(processed, Ordering::SeqCst);
        self.queued_count.store(processed + backlog, Ordering::SeqCst);
    }

    /// Record one event. Called synchronously on the firing path so counts
    /// are exact rather than subject to broadcast lag.
    pub fn record(&self, event: &CrawlEvent) {
        match event.kind {
            CrawlEventKind::DocumentProcessed => {
                self.processed_count.fetch_add(1, Ordering::SeqCst);
            }
            CrawlEventKind::DocumentQueued => {
                self.queued_count.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        *self.event_counts.entry(event.kind.name()).or_insert(0) += 1;
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::SeqCst)
    }

    pub fn queued_count(&self) -> u64 {
        self.queued_count.load(Ordering::SeqCst)
    }

    /// Per-event-name counts, sorted by name.
    pub fn event_counts(&self) -> Vec<(&'static str, u64)> {
        let mut counts: Vec<(&'static str, u64)> = self
            .event_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        counts.sort_by_key(|(name, _)| *name);
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_counts_processed_and_queued() {
        let monitor = CrawlerMonitor::new();
        monitor.record(&CrawlEvent::for_reference(
            CrawlEventKind::DocumentQueued,
            "a",
        ));
        monitor.record(&CrawlEvent::for_reference(
            CrawlEventKind::DocumentQueued,
            "b",
        ));
        monitor.record(&CrawlEvent::for_reference(
            CrawlEventKind::DocumentProcessed,
            "a",
        ));

        assert_eq!(monitor.queued_count(), 2);
        assert_eq!(monitor.processed_count(), 1);
    }

    #[test]
    fn test_monitor_seed_carries_resumed_counts() {
        let monitor = CrawlerMonitor::new();
        monitor.seed(40, 100);
        monitor.record(&CrawlEvent::for_reference(
            CrawlEventKind::DocumentProcessed,
            "a",
        ));
        assert_eq!(monitor.processed_count(), 41);
        // Cumulative queued covers both the finalized and the waiting work.
        assert_eq!(monitor.queued_count(), 140);
    }

    #[test]
    fn test_event_counts_are_sorted_by_name() {
        let monitor = CrawlerMonitor::new();
        monitor.record(&CrawlEvent::new(CrawlEventKind::CrawlerRunBegin));
        monitor.record(&CrawlEvent::new(CrawlEventKind::CrawlerInitBegin));
        let counts = monitor.event_counts();
        assert_eq!(counts[0].0, "CRAWLER_INIT_BEGIN");
        assert_eq!(counts[1].0, "CRAWLER_RUN_BEGIN");
    }
}
