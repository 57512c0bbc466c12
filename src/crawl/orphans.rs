//! # Orphan Handling
//!
//! After the queue drains, references still sitting in the cache were never
//! re-encountered this run - they are orphans. Depending on the configured
//! strategy they are re-queued for normal processing, queued for deletion,
//! or left alone.

use std::sync::Arc;
use tracing::{debug, info};

use super::context::CrawlContext;
use super::worker::run_worker_pool;
use crate::config::OrphansStrategy;
use crate::doc::DocRecord;
use crate::error::Result;

pub(crate) async fn handle_orphans(ctx: &Arc<CrawlContext>) -> Result<()> {
    match ctx.config.orphans_strategy {
        // If PROCESS, we do not care to validate whether the entries really
        // are orphans: all remaining cache items get reprocessed regardless.
        OrphansStrategy::Process => reprocess_cache_orphans(ctx).await,
        OrphansStrategy::Delete => delete_cache_orphans(ctx).await,
        OrphansStrategy::Ignore => {
            debug!(crawler_id = %ctx.config.id, "Leaving orphan references alone (if any).");
            Ok(())
        }
    }
}

async fn reprocess_cache_orphans(ctx: &Arc<CrawlContext>) -> Result<()> {
    if ctx.is_max_docs_reached() {
        info!(
            crawler_id = %ctx.config.id,
            "Max documents reached. Not reprocessing orphans (if any). \
             Run the crawler again to resume."
        );
        return Ok(());
    }
    info!(crawler_id = %ctx.config.id, "Queueing orphan references for processing...");
    let count = queue_remaining_cache(ctx).await?;
    if count > 0 {
        info!(crawler_id = %ctx.config.id, "Reprocessing {count} orphan references...");
        run_worker_pool(ctx, false, true).await?;
    }
    info!(crawler_id = %ctx.config.id, "Reprocessed {count} cached/orphan references.");
    Ok(())
}

async fn delete_cache_orphans(ctx: &Arc<CrawlContext>) -> Result<()> {
    info!(crawler_id = %ctx.config.id, "Queueing orphan references for deletion...");
    let count = queue_remaining_cache(ctx).await?;
    if count > 0 {
        info!(crawler_id = %ctx.config.id, "Deleting {count} orphan references...");
        run_worker_pool(ctx, true, true).await?;
    }
    info!(crawler_id = %ctx.config.id, "Deleted {count} orphan references.");
    Ok(())
}

async fn queue_remaining_cache(ctx: &Arc<CrawlContext>) -> Result<u64> {
    let mut orphans: Vec<DocRecord> = Vec::new();
    let count = ctx
        .ledger
        .for_each_cached(|_, record| {
            orphans.push(record);
            true
        })
        .await?;
    for record in orphans {
        ctx.ledger.queue(&record).await?;
    }
    Ok(count)
}
