//! # Document Ledger
//!
//! Tracks every reference's position in the crawl lifecycle through four
//! named views backed by the store engine:
//!
//! - **queue**: references awaiting processing
//! - **active**: references currently checked out by a worker
//! - **processed**: this run's finalized records
//! - **cached**: last run's finalized records, read-only during a run
//!
//! A reference popped from the queue stays in active until finalized, at
//! which point it moves to processed and leaves active (and cached). A
//! cached reference never re-encountered this run is an orphan.

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::record::DocRecord;
use crate::error::Result;
use crate::events::{CrawlEvent, CrawlEventKind, EventBus};
use crate::store::{Store, StoreEngine};

pub struct DocLedger {
    crawler_id: String,
    queue: Store<DocRecord>,
    active: Store<DocRecord>,
    processed: Store<DocRecord>,
    cached: Store<DocRecord>,
    events: EventBus,
    /// Serializes queue-pop plus active-mark so a reference is never handed
    /// to two workers.
    poll_lock: Mutex<()>,
}

impl DocLedger {
    /// Open the four ledger views and prepare them for a session.
    ///
    /// When `resume` is requested and the prior session left unfinished work
    /// (non-empty queue or active view), the session resumes: in-flight
    /// references are pushed back into the queue. Otherwise a fresh session
    /// starts and last run's processed view is promoted to the cache.
    ///
    /// Returns the ledger and whether the session resumed.
    pub async fn open(
        engine: &dyn StoreEngine,
        crawler_id: &str,
        events: EventBus,
        resume: bool,
    ) -> Result<(Self, bool)> {
        let open = |name: &str| format!("{crawler_id}.{name}");

        let mut ledger = Self {
            crawler_id: crawler_id.to_string(),
            queue: Store::new(engine.open_store(&open("queued")).await?),
            active: Store::new(engine.open_store(&open("active")).await?),
            processed: Store::new(engine.open_store(&open("processed")).await?),
            cached: Store::new(engine.open_store(&open("cached")).await?),
            events,
            poll_lock: Mutex::new(()),
        };

        let resumable = !ledger.is_queue_empty().await? || !ledger.is_active_empty().await?;

        if resume && resumable {
            ledger.resume_prior_session().await?;
            Ok((ledger, true))
        } else {
            ledger.start_fresh_session(engine).await?;
            Ok((ledger, false))
        }
    }

    async fn resume_prior_session(&self) -> Result<()> {
        debug!(crawler_id = %self.crawler_id, "Moving active references back into queue.");
        let mut leftovers: Vec<(String, DocRecord)> = Vec::new();
        self.active
            .for_each(|id, rec| {
                leftovers.push((id.to_string(), rec));
                true
            })
            .await?;
        for (id, rec) in leftovers {
            self.queue.save(&id, &rec).await?;
        }
        self.active.clear().await?;

        let processed_count = self.processed.count().await?;
        let total_count = processed_count + self.queue.count().await? + self.cached.count().await?;
        let percent = if total_count == 0 {
            0.0
        } else {
            processed_count as f64 * 100.0 / total_count as f64
        };
        info!(
            crawler_id = %self.crawler_id,
            "🔄 RESUMING at {percent:.2}% ({processed_count}/{total_count})."
        );
        Ok(())
    }

    async fn start_fresh_session(&mut self, engine: &dyn StoreEngine) -> Result<()> {
        self.cached.clear().await?;
        self.active.clear().await?;
        self.queue.clear().await?;

        // Promote last run's processed view to this run's cache:
        // cached -> swap, processed -> cached, swap -> processed.
        debug!(crawler_id = %self.crawler_id, "Caching valid references from previous run.");
        let name = |n: &str| format!("{}.{n}", self.crawler_id);
        engine.rename_store(&name("cached"), &name("swap")).await?;
        engine
            .rename_store(&name("processed"), &name("cached"))
            .await?;
        engine
            .rename_store(&name("swap"), &name("processed"))
            .await?;
        // Handles track table identity; follow the rename.
        std::mem::swap(&mut self.cached, &mut self.processed);

        let cache_count = self.cached.count().await?;
        if cache_count > 0 {
            info!(
                crawler_id = %self.crawler_id,
                "🚀 STARTING an incremental crawl from previous {cache_count} valid references."
            );
        } else {
            info!(crawler_id = %self.crawler_id, "🚀 STARTING a fresh crawl.");
        }
        Ok(())
    }

    //--- Queue ---

    /// Insert a record into the queue. Duplicate suppression within one
    /// seeding pass is the caller's responsibility.
    pub async fn queue(&self, record: &DocRecord) -> Result<()> {
        self.queue.save(&record.reference, record).await?;
        debug!(reference = %record.reference, "Saved queued.");
        self.events.fire(CrawlEvent::for_reference(
            CrawlEventKind::DocumentQueued,
            &record.reference,
        ));
        Ok(())
    }

    /// Atomically remove and return one queued record, marking it active.
    /// Returns `None` without blocking when the queue is empty.
    pub async fn poll_queue(&self) -> Result<Option<DocRecord>> {
        let _guard = self.poll_lock.lock().await;
        let record = self.queue.delete_first().await?;
        if let Some(record) = &record {
            self.active.save(&record.reference, record).await?;
            debug!(reference = %record.reference, "Saved active.");
        }
        Ok(record)
    }

    pub async fn is_queue_empty(&self) -> Result<bool> {
        self.queue.is_empty().await
    }

    pub async fn queue_count(&self) -> Result<u64> {
        self.queue.count().await
    }

    //--- Active ---

    pub async fn is_active_empty(&self) -> Result<bool> {
        self.active.is_empty().await
    }

    pub async fn active_count(&self) -> Result<u64> {
        self.active.count().await
    }

    //--- Processed ---

    pub async fn processed_count(&self) -> Result<u64> {
        self.processed.count().await
    }

    pub async fn get_processed(&self, reference: &str) -> Result<Option<DocRecord>> {
        self.processed.find(reference).await
    }

    /// Record a reference as finalized for this run: saved into processed,
    /// removed from active and from the cache.
    pub async fn mark_processed(&self, record: &DocRecord) -> Result<()> {
        self.processed.save(&record.reference, record).await?;
        let cache_deleted = self.cached.delete(&record.reference).await?;
        let active_deleted = self.active.delete(&record.reference).await?;
        debug!(
            reference = %record.reference,
            cache_deleted,
            active_deleted,
            "Saved processed."
        );
        self.events.fire(CrawlEvent::for_reference(
            CrawlEventKind::DocumentProcessed,
            &record.reference,
        ));
        Ok(())
    }

    //--- Cache ---

    pub async fn get_cached(&self, reference: &str) -> Result<Option<DocRecord>> {
        self.cached.find(reference).await
    }

    pub async fn cached_count(&self) -> Result<u64> {
        self.cached.count().await
    }

    /// Visit cached records until the visitor returns false; returns how
    /// many were visited.
    pub async fn for_each_cached<F>(&self, mut visitor: F) -> Result<u64>
    where
        F: FnMut(&str, DocRecord) -> bool + Send,
    {
        let mut count = 0u64;
        self.cached
            .for_each(|id, rec| {
                count += 1;
                visitor(id, rec)
            })
            .await?;
        Ok(count)
    }
}

impl std::fmt::Debug for DocLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocLedger")
            .field("crawler_id", &self.crawler_id)
            .finish()
    }
}
