use async_trait::async_trait;

use crate::doc::Document;
use crate::error::Result;

/// External commit/output sink contract.
///
/// Upserts and deletions are fire-and-forget from the core's perspective:
/// delivery guarantees, batching, and retries are the sink's concern. An
/// error returned here surfaces as a per-reference processing failure.
#[async_trait]
pub trait CommitSink: Send + Sync {
    async fn upsert(&self, doc: &Document) -> Result<()>;

    async fn delete(&self, doc: &Document) -> Result<()>;

    /// Wipe any sink-side state associated with this crawler (e.g. committed
    /// documents, queued batches). Invoked by the crawler's own clean
    /// operation; sinks with nothing to clear keep the default no-op.
    async fn clean(&self) -> Result<()> {
        Ok(())
    }
}
