//! # Crawl Session
//!
//! The orchestrator tying everything together: opens the ledger (detecting
//! resumable prior sessions), starts cluster coordination when configured,
//! seeds the queue, drains it with the worker pool, handles orphans, and
//! shuts everything down in reverse dependency order.
//!
//! ## Cluster phases
//!
//! With clustering enabled, queue seeding runs on a single claimed instance
//! (`INIT_QUEUE`), the crawl itself runs on all instances behind a barrier
//! (`CRAWLING`), and orphan handling again runs on a single claimed
//! instance. The final state written to the shared store (`COMPLETED` or
//! `STOPPED`) releases any instance still waiting on a phase.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::CrawlContext;
use super::orphans::handle_orphans;
use super::worker::run_worker_pool;
use crate::cluster::{ClusterService, CrawlerState};
use crate::config::CrawlConfig;
use crate::doc::{DocLedger, DocRecord};
use crate::error::{CrawlError, Result};
use crate::events::{CrawlEventKind, CrawlerMonitor, EventBus, EventPublisher};
use crate::pipeline::{
    CommitSink, GenericSpoiledReferenceStrategizer, ImportPipeline, SpoiledReferenceStrategizer,
};
use crate::progress::ProgressLogger;
use crate::store::StoreEngine;

pub struct CrawlSessionBuilder {
    config: CrawlConfig,
    engine: Arc<dyn StoreEngine>,
    importer: Option<Arc<dyn ImportPipeline>>,
    committer: Option<Arc<dyn CommitSink>>,
    spoiler: Arc<dyn SpoiledReferenceStrategizer>,
    publisher: EventPublisher,
}

impl CrawlSessionBuilder {
    pub fn new(config: CrawlConfig, engine: Arc<dyn StoreEngine>) -> Self {
        Self {
            config,
            engine,
            importer: None,
            committer: None,
            spoiler: Arc::new(GenericSpoiledReferenceStrategizer::default()),
            publisher: EventPublisher::default(),
        }
    }

    pub fn importer(mut self, importer: Arc<dyn ImportPipeline>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn committer(mut self, committer: Arc<dyn CommitSink>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn spoiler(mut self, spoiler: Arc<dyn SpoiledReferenceStrategizer>) -> Self {
        self.spoiler = spoiler;
        self
    }

    pub fn publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn build(self) -> Result<CrawlSession> {
        let importer = self.importer.ok_or_else(|| {
            CrawlError::Configuration("An import pipeline is required.".to_string())
        })?;
        let committer = self.committer.ok_or_else(|| {
            CrawlError::Configuration("A commit sink is required.".to_string())
        })?;
        Ok(CrawlSession {
            config: self.config,
            engine: self.engine,
            importer,
            committer,
            spoiler: self.spoiler,
            events: EventBus::new(self.publisher, Arc::new(CrawlerMonitor::new())),
            active_ctx: RwLock::new(None),
        })
    }
}

/// One orchestrator instance driving one crawl run.
pub struct CrawlSession {
    config: CrawlConfig,
    engine: Arc<dyn StoreEngine>,
    importer: Arc<dyn ImportPipeline>,
    committer: Arc<dyn CommitSink>,
    spoiler: Arc<dyn SpoiledReferenceStrategizer>,
    events: EventBus,
    active_ctx: RwLock<Option<Arc<CrawlContext>>>,
}

impl CrawlSession {
    pub fn builder(config: CrawlConfig, engine: Arc<dyn StoreEngine>) -> CrawlSessionBuilder {
        CrawlSessionBuilder::new(config, engine)
    }

    /// The session's event bus, for subscribing to lifecycle events and
    /// reading monitor counters.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run the crawl to completion (or until stopped).
    pub async fn start(&self) -> Result<()> {
        let config = self.config.clone();

        self.events.fire_kind(CrawlEventKind::CrawlerInitBegin);
        info!(crawler_id = %config.id, "🕸️ CRAWLER: Initializing session.");

        let (ledger, resumed) = DocLedger::open(
            self.engine.as_ref(),
            &config.id,
            self.events.clone(),
            config.resume,
        )
        .await?;
        let processed = ledger.processed_count().await?;
        let queued = ledger.queue_count().await?;
        self.events.monitor().seed(processed, queued);

        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let cluster = if config.cluster_enabled {
            let service =
                ClusterService::open(self.engine.as_ref(), &config, &instance_id).await?;
            service.start();
            info!(
                crawler_id = %config.id,
                instance_id = %instance_id,
                "🌐 CLUSTER: Coordination started."
            );
            Some(service)
        } else {
            None
        };

        let progress = Arc::new(ProgressLogger::new(
            Arc::clone(self.events.monitor()),
            config.min_progress_logging_interval(),
        ));
        let ctx = Arc::new(CrawlContext::new(
            config,
            ledger,
            self.events.clone(),
            Arc::clone(&self.importer),
            Arc::clone(&self.committer),
            Arc::clone(&self.spoiler),
            Arc::clone(&progress),
            resumed,
        ));
        *self.active_ctx.write() = Some(Arc::clone(&ctx));
        self.events.fire_kind(CrawlEventKind::CrawlerInitEnd);

        self.events.fire_kind(CrawlEventKind::CrawlerRunBegin);
        progress.start_tracking();

        let result = self.execute(&ctx, cluster.as_ref()).await;
        self.destroy(&ctx, cluster.as_ref()).await;
        result
    }

    /// Request a graceful stop of the running session. Workers finish their
    /// current reference's finalize step, then exit; a stopped run can be
    /// resumed.
    pub fn stop(&self) {
        let ctx = self.active_ctx.read().clone();
        match ctx {
            Some(ctx) => ctx.request_stop(),
            None => info!(
                crawler_id = %self.config.id,
                "CANNOT STOP: this crawler does not appear to be running."
            ),
        }
    }

    /// Wipe the crawler's persisted state, along with whatever the commit
    /// sink holds for it, making the next run behave like a first run.
    pub async fn clean(&self) -> Result<()> {
        self.events.fire_kind(CrawlEventKind::CrawlerCleanBegin);
        info!(crawler_id = %self.config.id, "🧹 CRAWLER: Cleaning persisted crawl state.");
        self.committer.clean().await?;
        self.engine.clean().await?;
        self.events.fire_kind(CrawlEventKind::CrawlerCleanEnd);
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &Arc<CrawlContext>,
        cluster: Option<&ClusterService>,
    ) -> Result<()> {
        // Initial queue seeding. Clustered: exactly one instance seeds the
        // shared queue; local: seeding runs concurrently with the pool and
        // workers wait for the seeded flag before declaring the queue dry.
        // Resumed sessions keep their carried-over queue untouched: re-seeding
        // would push already-finalized references through a second pass.
        let seeder = if ctx.resumed() {
            info!(
                crawler_id = %ctx.config.id,
                "Resuming: start references were queued on a previous run."
            );
            ctx.mark_queue_initialized();
            None
        } else {
            match cluster {
                Some(service) => {
                    let seed_ctx = Arc::clone(ctx);
                    service
                        .on_single_instance(CrawlerState::InitQueue, move || async move {
                            seed_queue(&seed_ctx).await
                        })
                        .await?;
                    ctx.mark_queue_initialized();
                    None
                }
                None => {
                    let seed_ctx = Arc::clone(ctx);
                    Some(tokio::spawn(async move {
                        if let Err(e) = seed_queue(&seed_ctx).await {
                            error!(crawler_id = %seed_ctx.config.id, "Could not seed the queue: {e}");
                            seed_ctx.request_stop();
                        }
                        seed_ctx.mark_queue_initialized();
                    }))
                }
            }
        };

        if !ctx.is_stop_requested() {
            info!(crawler_id = %ctx.config.id, "Crawling references...");
            match cluster {
                Some(service) => {
                    let crawl_ctx = Arc::clone(ctx);
                    service
                        .on_all_instances(CrawlerState::Crawling, move || async move {
                            run_worker_pool(&crawl_ctx, false, false).await
                        })
                        .await?;
                }
                None => run_worker_pool(ctx, false, false).await?,
            }
        }
        if let Some(handle) = seeder {
            let _ = handle.await;
        }

        if !ctx.is_stop_requested() {
            match cluster {
                Some(service) => {
                    let orphan_ctx = Arc::clone(ctx);
                    service
                        .on_single_instance(CrawlerState::InitQueue, move || async move {
                            handle_orphans(&orphan_ctx).await
                        })
                        .await?;
                }
                None => handle_orphans(ctx).await?,
            }
        }
        Ok(())
    }

    async fn destroy(&self, ctx: &Arc<CrawlContext>, cluster: Option<&ClusterService>) {
        let stopped = ctx.is_stop_requested();
        info!(
            crawler_id = %ctx.config.id,
            "Crawler {}",
            if stopped { "stopped." } else { "completed." }
        );
        ctx.progress.stop_tracking();
        info!(
            crawler_id = %ctx.config.id,
            "Execution Summary:{}",
            ctx.progress.execution_summary()
        );

        if let Some(service) = cluster {
            let final_state = if stopped {
                CrawlerState::Stopped
            } else {
                CrawlerState::Completed
            };
            if let Err(e) = service.set_cluster_state(final_state).await {
                warn!("Could not record final cluster state: {e}");
            }
            if let Err(e) = service.advertise_state(final_state).await {
                warn!("Could not record final instance state: {e}");
            }
            service.shutdown().await;
        }

        if stopped {
            self.events.fire_kind(CrawlEventKind::CrawlerStopEnd);
        }
        self.events.fire_kind(CrawlEventKind::CrawlerRunEnd);
        *self.active_ctx.write() = None;
    }
}

impl std::fmt::Debug for CrawlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlSession")
            .field("crawler_id", &self.config.id)
            .finish()
    }
}

async fn seed_queue(ctx: &Arc<CrawlContext>) -> Result<()> {
    for reference in &ctx.config.start_references {
        if ctx.is_stop_requested() {
            break;
        }
        ctx.ledger.queue(&DocRecord::new(reference)).await?;
    }
    Ok(())
}
