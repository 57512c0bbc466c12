use async_trait::async_trait;

use crate::doc::{DocState, Document};
use crate::error::Result;

/// Outcome of running one document through the external import pipeline.
///
/// A response may carry nested child responses (e.g. attachments or
/// embedded documents); each child is processed as an independent document
/// with its own record, cache lookup, and finalization.
#[derive(Debug, Clone)]
pub struct ImporterResponse {
    pub reference: String,
    pub success: bool,
    /// Human-readable status from the pipeline.
    pub status: String,
    /// Outcome state the pipeline assigned to this (child) document.
    /// Successful children without an explicit state are treated as new.
    pub state: Option<DocState>,
    pub content: Option<Vec<u8>>,
    pub children: Vec<ImporterResponse>,
}

impl ImporterResponse {
    pub fn success(reference: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            success: true,
            status: status.into(),
            state: None,
            content: None,
            children: Vec::new(),
        }
    }

    pub fn failure(reference: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(reference, status)
        }
    }

    pub fn with_state(mut self, state: DocState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_child(mut self, child: ImporterResponse) -> Self {
        self.children.push(child);
        self
    }
}

/// External fetch/transform pipeline contract.
///
/// The pipeline owns fetching, parsing, and metadata extraction; it mutates
/// the document's record state (new/modified/unmodified/rejected/...) as its
/// stages run. Returning `None` means the pipeline never engaged, which the
/// core treats as an implicit rejection.
#[async_trait]
pub trait ImportPipeline: Send + Sync {
    async fn apply(&self, doc: &mut Document) -> Result<Option<ImporterResponse>>;
}
