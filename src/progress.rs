//! # Progress Reporting
//!
//! Periodic throughput logging over the monitor's counters. Lines are
//! emitted no more often than the configured minimum interval; at debug
//! verbosity an extrapolated completion estimate is appended.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

use crate::events::CrawlerMonitor;

pub struct ProgressLogger {
    monitor: Arc<CrawlerMonitor>,
    min_interval: Option<Duration>,
    state: Mutex<ProgressState>,
    stop_requested: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Default)]
struct ProgressState {
    started_at: Option<Instant>,
    prev_processed: u64,
    prev_queued: u64,
    prev_elapsed: Duration,
}

impl ProgressLogger {
    pub fn new(monitor: Arc<CrawlerMonitor>, min_interval: Option<Duration>) -> Self {
        // Anything under a second would flood the log; treat it as disabled.
        let min_interval = min_interval.filter(|i| *i >= Duration::from_secs(1));
        Self {
            monitor,
            min_interval,
            state: Mutex::new(ProgressState::default()),
            stop_requested: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Begin tracking. Spawns the periodic logging task when an interval is
    /// configured.
    pub fn start_tracking(self: &Arc<Self>) {
        self.stop_requested.store(false, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            state.started_at = Some(Instant::now());
            state.prev_processed = self.monitor.processed_count();
            state.prev_queued = self
                .monitor
                .queued_count()
                .saturating_sub(state.prev_processed);
            state.prev_elapsed = Duration::ZERO;
        }
        if let Some(interval) = self.min_interval {
            let logger = Arc::clone(self);
            let handle = tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    if logger.stop_requested.load(Ordering::SeqCst) {
                        break;
                    }
                    logger.maybe_log();
                }
            });
            *self.task.lock() = Some(handle);
        }
    }

    pub fn stop_tracking(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// Log a progress line if at least the minimum interval elapsed since
    /// the previous one. Also invoked opportunistically after each document
    /// is finalized.
    pub fn maybe_log(&self) {
        let Some(min_interval) = self.min_interval else {
            return;
        };
        let mut state = self.state.lock();
        let Some(started_at) = state.started_at else {
            return;
        };
        let elapsed = started_at.elapsed();
        if elapsed < state.prev_elapsed + min_interval {
            return;
        }

        let processed = self.monitor.processed_count();
        // The monitor's queued counter is cumulative; the difference is the
        // current backlog.
        let queued = self.monitor.queued_count().saturating_sub(processed);
        let delta_elapsed = elapsed - state.prev_elapsed;
        let throughput = rate_per_sec(processed.saturating_sub(state.prev_processed), delta_elapsed);

        let mut msg = format!(
            "{processed}({}) processed | {queued}({}) queued | {throughput:.1} processed/sec | {} elapsed",
            plus_minus(processed as i64 - state.prev_processed as i64),
            plus_minus(queued as i64 - state.prev_queued as i64),
            format_duration(elapsed),
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            let total_so_far = processed + queued;
            let percent = if total_so_far == 0 {
                0.0
            } else {
                processed as f64 * 100.0 / total_so_far as f64
            };
            msg.push_str(&format!(
                " | ≈{percent:.2}% complete | ≈{} remaining",
                format_duration(remaining_estimate(elapsed, queued, processed)),
            ));
        }
        info!("{msg}");

        state.prev_processed = processed;
        state.prev_queued = queued;
        state.prev_elapsed = elapsed;
    }

    /// Human-readable run totals, logged once at the end of a session.
    pub fn execution_summary(&self) -> String {
        let elapsed = self
            .state
            .lock()
            .started_at
            .map(|s| s.elapsed())
            .unwrap_or_default();
        let processed = self.monitor.processed_count();
        let mut summary = format!(
            "\nTotal processed:   {processed}\
             \nSince (re)start:\
             \n  Crawl duration:  {}\
             \n  Avg. throughput: {:.1} processed/seconds\
             \n  Event counts (incl. resumed):",
            format_duration(elapsed),
            rate_per_sec(processed, elapsed),
        );
        for (name, count) in self.monitor.event_counts() {
            summary.push_str(&format!("\n    {name:<32}{count}"));
        }
        summary
    }
}

impl std::fmt::Debug for ProgressLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressLogger")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

fn plus_minus(val: i64) -> String {
    if val >= 0 {
        format!("+{val}")
    } else {
        val.to_string()
    }
}

fn rate_per_sec(delta: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        delta as f64 / secs
    }
}

/// Completion estimate: elapsed × queued / processed.
fn remaining_estimate(elapsed: Duration, queued: u64, processed: u64) -> Duration {
    if processed == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(elapsed.as_secs_f64() * queued as f64 / processed as f64)
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CrawlEvent, CrawlEventKind};

    #[test]
    fn test_rate_per_sec() {
        assert_eq!(rate_per_sec(10, Duration::from_secs(5)), 2.0);
        assert_eq!(rate_per_sec(10, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_remaining_estimate_scales_with_queue() {
        let remaining = remaining_estimate(Duration::from_secs(60), 200, 100);
        assert_eq!(remaining, Duration::from_secs(120));
        assert_eq!(
            remaining_estimate(Duration::from_secs(60), 200, 0),
            Duration::ZERO
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn test_plus_minus() {
        assert_eq!(plus_minus(5), "+5");
        assert_eq!(plus_minus(0), "+0");
        assert_eq!(plus_minus(-3), "-3");
    }

    #[tokio::test]
    async fn test_execution_summary_lists_event_counts() {
        let monitor = Arc::new(CrawlerMonitor::new());
        monitor.record(&CrawlEvent::for_reference(
            CrawlEventKind::DocumentProcessed,
            "a",
        ));
        let logger = Arc::new(ProgressLogger::new(Arc::clone(&monitor), None));
        logger.start_tracking();
        let summary = logger.execution_summary();
        assert!(summary.contains("Total processed:   1"));
        assert!(summary.contains("DOCUMENT_PROCESSED"));
        logger.stop_tracking();
    }
}
