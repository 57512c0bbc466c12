use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::CrawlConfig;
use crate::doc::DocLedger;
use crate::error::CrawlError;
use crate::events::{CrawlEventKind, EventBus};
use crate::pipeline::{CommitSink, ImportPipeline, SpoiledReferenceStrategizer};
use crate::progress::ProgressLogger;

/// Shared state for one crawl run, handed read-only to every worker.
///
/// The only mutable members are the stop and queue-seeded flags; everything
/// else is either immutable configuration or internally synchronized.
pub struct CrawlContext {
    pub config: CrawlConfig,
    pub ledger: DocLedger,
    pub events: EventBus,
    pub importer: Arc<dyn ImportPipeline>,
    pub committer: Arc<dyn CommitSink>,
    pub spoiler: Arc<dyn SpoiledReferenceStrategizer>,
    pub progress: Arc<ProgressLogger>,
    stop_requested: AtomicBool,
    queue_initialized: AtomicBool,
    resumed: bool,
    /// Document cap for this run, including documents carried over from
    /// resumed sessions; -1 means unbounded.
    resumable_max_docs: i64,
}

impl CrawlContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CrawlConfig,
        ledger: DocLedger,
        events: EventBus,
        importer: Arc<dyn ImportPipeline>,
        committer: Arc<dyn CommitSink>,
        spoiler: Arc<dyn SpoiledReferenceStrategizer>,
        progress: Arc<ProgressLogger>,
        resumed: bool,
    ) -> Self {
        let mut resumable_max_docs = config.max_documents;
        if config.max_documents > -1 && resumed {
            resumable_max_docs = config.max_documents + events.monitor().processed_count() as i64;
            info!(
                crawler_id = %config.id,
                "Adding configured maximum documents ({}) to this resumed session. \
                 The combined maximum for this run and previous stopped one(s) is: {}",
                config.max_documents,
                resumable_max_docs
            );
        }
        Self {
            config,
            ledger,
            events,
            importer,
            committer,
            spoiler,
            progress,
            stop_requested: AtomicBool::new(false),
            queue_initialized: AtomicBool::new(false),
            resumed,
            resumable_max_docs,
        }
    }

    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// Request a graceful stop. Workers finish their current reference's
    /// finalize step and exit. Idempotent; the first request fires
    /// `CRAWLER_STOP_BEGIN`.
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            info!(crawler_id = %self.config.id, "🛑 Stopping the crawler.");
            self.events.fire_kind(CrawlEventKind::CrawlerStopBegin);
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Signal that the initial queue-seeding phase completed.
    pub fn mark_queue_initialized(&self) {
        self.queue_initialized.store(true, Ordering::SeqCst);
    }

    pub fn is_queue_initialized(&self) -> bool {
        self.queue_initialized.load(Ordering::SeqCst)
    }

    pub fn max_docs(&self) -> i64 {
        self.resumable_max_docs
    }

    pub fn is_max_docs_reached(&self) -> bool {
        self.resumable_max_docs > -1
            && self.events.monitor().processed_count() as i64 >= self.resumable_max_docs
    }

    /// Whether a per-reference failure of this kind escalates to a
    /// pool-wide stop.
    pub fn should_stop_on(&self, error: &CrawlError) -> bool {
        self.config
            .stop_on_errors
            .iter()
            .any(|kind| kind == error.kind())
    }
}

impl std::fmt::Debug for CrawlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlContext")
            .field("crawler_id", &self.config.id)
            .field("stop_requested", &self.is_stop_requested())
            .field("queue_initialized", &self.is_queue_initialized())
            .finish()
    }
}
