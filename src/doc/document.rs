use tracing::warn;

use super::record::DocRecord;
use crate::error::Result;

/// Scoped content attached to a document for the duration of one pass.
///
/// Must be disposed on every exit path; disposal is idempotent and its
/// failures are logged, never propagated.
#[derive(Debug, Default)]
pub struct DocContent {
    data: Option<Vec<u8>>,
    disposed: bool,
}

impl DocContent {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: Some(data),
            disposed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release the backing content. Safe to call more than once.
    pub fn dispose(&mut self) -> Result<()> {
        self.data = None;
        self.disposed = true;
        Ok(())
    }
}

/// A document under processing: this run's record, its previous-run
/// counterpart when one exists, and the (possibly empty) content.
///
/// Created by the worker that dequeues the reference and destroyed at the
/// end of finalization, including for synthesized child documents.
#[derive(Debug)]
pub struct Document {
    pub record: DocRecord,
    pub cached_record: Option<DocRecord>,
    pub content: DocContent,
    /// Set when this document came back through orphan handling. Derived at
    /// processing time, never persisted.
    pub is_orphan: bool,
}

impl Document {
    pub fn new(
        record: DocRecord,
        cached_record: Option<DocRecord>,
        content: DocContent,
        is_orphan: bool,
    ) -> Self {
        Self {
            record,
            cached_record,
            content,
            is_orphan,
        }
    }

    pub fn reference(&self) -> &str {
        &self.record.reference
    }

    /// Whether this reference was never seen by a prior run.
    pub fn is_crawl_new(&self) -> bool {
        self.cached_record.is_none()
    }

    pub fn dispose_content(&mut self) {
        if let Err(e) = self.content.dispose() {
            warn!(reference = %self.record.reference, "Could not dispose of content: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_is_idempotent() {
        let mut content = DocContent::from_bytes(vec![1, 2, 3]);
        assert_eq!(content.len(), 3);
        assert!(!content.is_disposed());

        content.dispose().unwrap();
        assert!(content.is_disposed());
        assert_eq!(content.len(), 0);

        content.dispose().unwrap();
        assert!(content.is_disposed());
    }

    #[test]
    fn test_crawl_new_detection() {
        let doc = Document::new(DocRecord::new("a"), None, DocContent::empty(), false);
        assert!(doc.is_crawl_new());

        let doc = Document::new(
            DocRecord::new("a"),
            Some(DocRecord::new("a")),
            DocContent::empty(),
            false,
        );
        assert!(!doc.is_crawl_new());
    }
}
