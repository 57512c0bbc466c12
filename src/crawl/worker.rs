//! # Worker Pool
//!
//! A fixed-size set of concurrent workers drains the queue, each running an
//! identical loop: pop a reference, dispatch it through the upsert or delete
//! path, and always finalize exactly once. Workers share one stop flag; the
//! pool join waits for every worker to exit before orphan handling runs.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::context::CrawlContext;
use super::process::{self, ProcessContext};
use crate::doc::{DocContent, DocRecord, DocState, Document};
use crate::error::{CrawlError, Result};
use crate::events::{CrawlEvent, CrawlEventKind};

/// Yield duration while the queue is momentarily empty but other workers
/// are still active and may enqueue children.
const ACTIVE_WAIT_DELAY: Duration = Duration::from_millis(1);
/// Wait between retries while the initial queue seeding is still in flight.
const QUEUE_INIT_WAIT_DELAY: Duration = Duration::from_secs(1);
/// How long the pool join waits for all workers before proceeding anyway.
const POOL_TERMINATION_TIMEOUT: Duration = Duration::from_secs(600);

/// One worker of the pool, processing references until the queue is drained
/// or a stop is requested.
pub(crate) struct DocWorker {
    ctx: Arc<CrawlContext>,
    index: usize,
    deleting: bool,
    orphan: bool,
    idle_since: Option<Instant>,
}

impl DocWorker {
    pub fn new(ctx: Arc<CrawlContext>, index: usize, deleting: bool, orphan: bool) -> Self {
        Self {
            ctx,
            index,
            deleting,
            orphan,
            idle_since: None,
        }
    }

    pub async fn run(mut self) {
        debug!(crawler_id = %self.ctx.config.id, "Crawler worker #{} started.", self.index);
        self.ctx
            .events
            .fire_kind(CrawlEventKind::CrawlerRunThreadBegin);
        while !self.ctx.is_stop_requested() {
            match self.process_next_reference().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(
                        crawler_id = %self.ctx.config.id,
                        "Problem in worker #{} execution: {e}",
                        self.index
                    );
                    break;
                }
            }
        }
        debug!(crawler_id = %self.ctx.config.id, "Crawler worker #{} ended.", self.index);
        self.ctx
            .events
            .fire_kind(CrawlEventKind::CrawlerRunThreadEnd);
    }

    // Returns true to continue the loop, false to end this worker.
    async fn process_next_reference(&mut self) -> Result<bool> {
        // When deleting we proceed regardless of the document cap.
        if !self.deleting && self.ctx.is_max_docs_reached() {
            info!(
                crawler_id = %self.ctx.config.id,
                "Maximum documents reached for this session: {}",
                self.ctx.max_docs()
            );
            self.ctx.request_stop();
            return Ok(false);
        }

        let Some(record) = self.poll_queue().await? else {
            return self.when_queue_empty().await;
        };
        trace!(reference = %record.reference, "Pulled next reference from queue.");
        self.idle_since = None;

        let doc = self.build_doc(record).await?;
        let mut pctx = ProcessContext::new(doc);

        let outcome = if self.deleting {
            process::delete(&self.ctx, &mut pctx).await
        } else {
            process::upsert(&self.ctx, &mut pctx).await
        };
        if let Err(e) = outcome {
            let stop_crawler = self.handle_processing_error(&mut pctx, &e).await;
            if stop_crawler {
                self.ctx.request_stop();
                return Ok(false);
            }
        }
        // No-op when the normal or error path already finalized.
        process::finalize(&self.ctx, &mut pctx).await;
        Ok(true)
    }

    /// A failed queue poll means we can no longer read work and would loop
    /// on the same failure forever; treat it as unrecoverable.
    async fn poll_queue(&self) -> Result<Option<DocRecord>> {
        match self.ctx.ledger.poll_queue().await {
            Ok(record) => Ok(record),
            Err(e) => {
                error!(
                    crawler_id = %self.ctx.config.id,
                    "An unrecoverable error was detected. The crawler will stop. ({e})"
                );
                self.ctx.events.fire(
                    CrawlEvent::new(CrawlEventKind::CrawlerError).with_message(e.to_string()),
                );
                self.ctx.request_stop();
                Err(e)
            }
        }
    }

    async fn when_queue_empty(&mut self) -> Result<bool> {
        let active_empty = self.ctx.ledger.is_active_empty().await?;
        let queue_empty = self.ctx.ledger.is_queue_empty().await?;
        if active_empty && queue_empty {
            if !self.ctx.is_queue_initialized() {
                info!(
                    crawler_id = %self.ctx.config.id,
                    "References are still being queued. Waiting for new references..."
                );
                tokio::time::sleep(QUEUE_INIT_WAIT_DELAY).await;
                return Ok(true);
            }
            trace!("Queue is empty and no documents are currently being processed.");
            return Ok(false);
        }

        // Some activity is left: the queue can grow again. Yield briefly and
        // retry rather than blocking, to stay responsive when work reappears.
        tokio::time::sleep(ACTIVE_WAIT_DELAY).await;

        if let Some(idle_timeout) = self.ctx.config.idle_timeout() {
            let idle_since = *self.idle_since.get_or_insert_with(Instant::now);
            if idle_since.elapsed() > idle_timeout {
                warn!(
                    crawler_id = %self.ctx.config.id,
                    "Crawler worker #{} has been idle for more than {idle_timeout:?} and will \
                     be shut down. Queue empty: {queue_empty}. Active empty: {active_empty}.",
                    self.index
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn build_doc(&self, record: DocRecord) -> Result<Document> {
        let cached = self.ctx.ledger.get_cached(&record.reference).await?;
        Ok(Document::new(
            record,
            cached,
            DocContent::empty(),
            self.orphan,
        ))
    }

    // Returns true when the error must stop the whole crawler.
    async fn handle_processing_error(
        &self,
        pctx: &mut ProcessContext,
        error: &CrawlError,
    ) -> bool {
        let reference = pctx.doc.record.reference.clone();
        pctx.doc.record.set_state(DocState::Error);
        info!(reference = %reference, "Could not process document: {error}");
        self.ctx.events.fire(
            CrawlEvent::for_reference(CrawlEventKind::RejectedError, &reference)
                .with_message(error.to_string()),
        );
        process::finalize(&self.ctx, pctx).await;

        if self.ctx.should_stop_on(error) {
            error!(
                crawler_id = %self.ctx.config.id,
                "Encountered a crawler-stopping error as per configuration: {error}"
            );
            return true;
        }
        error!(
            crawler_id = %self.ctx.config.id,
            "Encountered the following crawler error and attempting to ignore it. \
             To force the crawler to stop upon encountering this error, use the \
             \"stop_on_errors\" configuration: {error}"
        );
        false
    }
}

/// Run a full pool of workers to completion.
pub(crate) async fn run_worker_pool(
    ctx: &Arc<CrawlContext>,
    deleting: bool,
    orphan: bool,
) -> Result<()> {
    let num_workers = ctx.config.num_threads.max(1);
    let mut handles = Vec::with_capacity(num_workers);
    for index in 1..=num_workers {
        debug!(crawler_id = %ctx.config.id, "Crawler worker #{index} starting...");
        let worker = DocWorker::new(Arc::clone(ctx), index, deleting, orphan);
        handles.push(tokio::spawn(worker.run()));
    }
    // The join is the latch: every worker must have exited before orphan
    // handling or shutdown may proceed.
    let join = async {
        for handle in handles {
            if let Err(e) = handle.await {
                error!(crawler_id = %ctx.config.id, "Failed to join crawler worker: {e}");
            }
        }
    };
    if tokio::time::timeout(POOL_TERMINATION_TIMEOUT, join)
        .await
        .is_err()
    {
        error!(
            crawler_id = %ctx.config.id,
            "Crawler workers did not terminate within {POOL_TERMINATION_TIMEOUT:?}. \
             Proceeding with shutdown anyway."
        );
    }
    Ok(())
}
