//! # Per-Document Processing
//!
//! The upsert and delete paths a worker dispatches each dequeued reference
//! into, and the finalize step that always follows - exactly once per
//! document, success or failure.
//!
//! Child documents produced by the import pipeline recurse through the same
//! upsert path as independent documents: each gets its own record, cache
//! lookup, and finalization.

use futures::future::BoxFuture;
use tracing::{debug, error, warn};

use super::context::CrawlContext;
use crate::doc::{DocContent, DocRecord, DocState, Document};
use crate::error::Result;
use crate::events::{CrawlEvent, CrawlEventKind};
use crate::pipeline::{GenericSpoiledReferenceStrategizer, ImporterResponse, SpoilStrategy};

/// Hard bound on nested-response recursion, protecting the call stack when
/// nesting depth is collaborator-influenced.
const MAX_NESTED_RESPONSE_DEPTH: u32 = 64;

/// Finalization progress for one document, threaded explicitly through the
/// recursive upsert/finalize calls so finalize can never run twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeState {
    Pending,
    Finalized,
}

pub(crate) struct ProcessContext {
    pub doc: Document,
    pub finalize_state: FinalizeState,
}

impl ProcessContext {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            finalize_state: FinalizeState::Pending,
        }
    }
}

/// Run one document through the import pipeline and commit the outcome.
///
/// An absent pipeline response is an implicit rejection: the record state is
/// forced to rejected when it was new/modified and finalize runs right away.
pub(crate) async fn upsert(ctx: &CrawlContext, pctx: &mut ProcessContext) -> Result<()> {
    debug!(reference = %pctx.doc.record.reference, "Processing reference.");
    let response = ctx.importer.apply(&mut pctx.doc).await?;
    match response {
        Some(response) => process_import_response(ctx, pctx, &response, 0).await,
        None => {
            if pctx
                .doc
                .record
                .state()
                .is_some_and(|s| s.is_new_or_modified())
            {
                pctx.doc.record.set_state(DocState::Rejected);
            }
            finalize(ctx, pctx).await;
            Ok(())
        }
    }
}

/// Force-delete one document through the commit sink.
///
/// Does not finalize; callers own that, whether through the worker loop's
/// guard or from within finalize's spoiled-reference handling.
pub(crate) async fn delete(ctx: &CrawlContext, pctx: &mut ProcessContext) -> Result<()> {
    debug!(reference = %pctx.doc.record.reference, "Deleting reference.");
    pctx.doc.record.set_state(DocState::Deleted);
    ctx.committer.delete(&pctx.doc).await?;
    ctx.events.fire_for(
        CrawlEventKind::DocumentCommittedDelete,
        &pctx.doc.record.reference,
    );
    Ok(())
}

fn process_import_response<'a>(
    ctx: &'a CrawlContext,
    pctx: &'a mut ProcessContext,
    response: &'a ImporterResponse,
    depth: u32,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let reference = pctx.doc.record.reference.clone();
        let mut msg = response.status.clone();
        if !response.children.is_empty() {
            msg.push_str(&format!(" ({} nested responses)", response.children.len()));
        }

        if response.success {
            ctx.events.fire(
                CrawlEvent::for_reference(CrawlEventKind::DocumentImported, &reference)
                    .with_message(&msg),
            );
            ctx.committer.upsert(&pctx.doc).await?;
            ctx.events
                .fire_for(CrawlEventKind::DocumentCommittedUpsert, &reference);
        } else {
            pctx.doc.record.set_state(DocState::Rejected);
            ctx.events.fire(
                CrawlEvent::for_reference(CrawlEventKind::RejectedImport, &reference)
                    .with_message(&msg),
            );
            debug!(reference = %reference, status = %response.status, "Importing unsuccessful.");
        }
        finalize(ctx, pctx).await;

        for child in &response.children {
            let mut child_record = DocRecord::child_of(&child.reference, &pctx.doc.record);
            match child.state {
                Some(state) => child_record.set_state(state),
                // A successful child the pipeline left unstated is new work.
                None if child.success => child_record.set_state(DocState::New),
                None => {}
            }
            if exceeds_depth(ctx, &child_record, depth + 1) {
                ctx.events
                    .fire_for(CrawlEventKind::RejectedTooDeep, &child.reference);
                warn!(
                    reference = %child.reference,
                    depth = child_record.depth,
                    "Nested response too deep; skipping."
                );
                continue;
            }
            let cached = ctx.ledger.get_cached(&child.reference).await?;
            let content = child
                .content
                .clone()
                .map(DocContent::from_bytes)
                .unwrap_or_default();
            let child_doc = Document::new(child_record, cached, content, pctx.doc.is_orphan);
            let mut child_pctx = ProcessContext::new(child_doc);
            process_import_response(ctx, &mut child_pctx, child, depth + 1).await?;
        }
        Ok(())
    })
}

fn exceeds_depth(ctx: &CrawlContext, record: &DocRecord, nesting: u32) -> bool {
    if nesting > MAX_NESTED_RESPONSE_DEPTH {
        return true;
    }
    ctx.config.max_depth > -1 && i64::from(record.depth) > ctx.config.max_depth
}

/// Finalize one document: idempotent per document, always attempted.
///
/// Failures in the cache-copy and spoiled-state steps are logged and
/// swallowed so that marking the reference processed and disposing of its
/// content still happen.
pub(crate) async fn finalize(ctx: &CrawlContext, pctx: &mut ProcessContext) {
    if pctx.finalize_state == FinalizeState::Finalized {
        return;
    }
    pctx.finalize_state = FinalizeState::Finalized;

    if pctx.doc.record.state().is_none() {
        warn!(
            reference = %pctx.doc.record.reference,
            "Reference status is unknown. This should not happen. Assuming bad status."
        );
        pctx.doc.record.set_state(DocState::BadStatus);
    }

    if let Err(e) = carry_cache_forward_and_handle_spoiled(ctx, pctx).await {
        error!(
            reference = %pctx.doc.record.reference,
            "Could not finalize processing: {e}"
        );
    }

    if let Err(e) = mark_processed_with_variations(ctx, pctx).await {
        error!(
            reference = %pctx.doc.record.reference,
            "Could not mark reference as processed: {e}"
        );
    }
    pctx.doc.dispose_content();
    ctx.progress.maybe_log();
}

async fn carry_cache_forward_and_handle_spoiled(
    ctx: &CrawlContext,
    pctx: &mut ProcessContext,
) -> Result<()> {
    // If the document is not new or modified, it did not go through the
    // entire crawl life cycle, so not all information could be gathered this
    // pass. Carry forward what an earlier effective run collected.
    let state = pctx.doc.record.state().unwrap_or(DocState::BadStatus);
    if !state.is_new_or_modified() {
        if let Some(cached) = pctx.doc.cached_record.clone() {
            pctx.doc.record.fill_missing_from(&cached);
        }
    }
    deal_with_bad_state(ctx, pctx).await
}

async fn deal_with_bad_state(ctx: &CrawlContext, pctx: &mut ProcessContext) -> Result<()> {
    let state = pctx.doc.record.state().unwrap_or(DocState::BadStatus);
    if state.is_good() || state == DocState::Deleted {
        return Ok(());
    }

    let reference = pctx.doc.record.reference.clone();
    let strategy = ctx
        .spoiler
        .resolve(&reference, state)
        .unwrap_or(GenericSpoiledReferenceStrategizer::FALLBACK);

    let cached_not_deleted = pctx
        .doc
        .cached_record
        .as_ref()
        .is_some_and(|c| c.state() != Some(DocState::Deleted));

    match strategy {
        SpoilStrategy::Ignore => {
            debug!(reference = %reference, "Ignoring spoiled reference.");
        }
        SpoilStrategy::Delete => {
            // Delete only when a previously committed version exists and is
            // not itself already deleted.
            if cached_not_deleted {
                delete(ctx, pctx).await?;
            }
        }
        SpoilStrategy::GraceOnce => {
            if cached_not_deleted {
                let cached_state = pctx
                    .doc
                    .cached_record
                    .as_ref()
                    .and_then(|c| c.state())
                    .unwrap_or(DocState::BadStatus);
                if cached_state.is_bad() {
                    // Two consecutive bad runs: delete.
                    delete(ctx, pctx).await?;
                } else {
                    debug!(
                        reference = %reference,
                        "This spoiled reference is being graced once \
                         (will be deleted next time if still spoiled)."
                    );
                }
            }
        }
    }
    Ok(())
}

async fn mark_processed_with_variations(
    ctx: &CrawlContext,
    pctx: &mut ProcessContext,
) -> Result<()> {
    ctx.ledger.mark_processed(&pctx.doc.record).await?;
    // A redirected/normalized reference must also count as processed, or
    // next run would treat the pre-normalization form as an orphan.
    if let Some(variation) = pctx.doc.record.for_original_reference() {
        ctx.ledger.mark_processed(&variation).await?;
    }
    Ok(())
}
