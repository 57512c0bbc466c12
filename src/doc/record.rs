use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::DocState;

/// One unit of work: the persistent record tracking a reference's lifecycle
/// across runs.
///
/// `reference` is the primary key within any single ledger view. When a
/// reference was normalized or redirected during processing,
/// `original_reference` keeps the pre-normalization form so it can also be
/// marked processed and never be mistaken for an orphan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DocState>,
    #[serde(default)]
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<String>,
    /// Opaque checksum over gathered metadata; computed by collaborators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_metadata: Option<String>,
    /// Opaque checksum over document content; computed by collaborators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_date: Option<DateTime<Utc>>,
}

impl DocRecord {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            original_reference: None,
            state: None,
            depth: 0,
            parent_reference: None,
            checksum_metadata: None,
            checksum_content: None,
            crawl_date: None,
        }
    }

    /// Build the record for a child document discovered while processing
    /// `parent`.
    pub fn child_of(reference: impl Into<String>, parent: &DocRecord) -> Self {
        Self {
            depth: parent.depth + 1,
            parent_reference: Some(parent.reference.clone()),
            ..Self::new(reference)
        }
    }

    pub fn state(&self) -> Option<DocState> {
        self.state
    }

    pub fn set_state(&mut self, state: DocState) {
        self.state = Some(state);
    }

    /// Whether the redirected/normalized form differs from the final
    /// reference and must be tracked separately.
    pub fn has_reference_variation(&self) -> bool {
        self.original_reference
            .as_deref()
            .is_some_and(|original| !original.is_empty() && original != self.reference)
    }

    /// The record variation used to mark the pre-normalization reference as
    /// processed.
    pub fn for_original_reference(&self) -> Option<DocRecord> {
        if !self.has_reference_variation() {
            return None;
        }
        let original = self.original_reference.clone()?;
        let mut variation = self.clone();
        variation.reference = original;
        variation.original_reference = None;
        Some(variation)
    }

    /// Copy forward any unset field from a prior run's record.
    ///
    /// Used when this run's pass was incomplete (state not new/modified):
    /// information gathered by an earlier effective pass must not be lost.
    /// Reference identity fields are never overwritten.
    pub fn fill_missing_from(&mut self, cached: &DocRecord) {
        if self.state.is_none() {
            self.state = cached.state;
        }
        if self.parent_reference.is_none() {
            self.parent_reference = cached.parent_reference.clone();
        }
        if self.checksum_metadata.is_none() {
            self.checksum_metadata = cached.checksum_metadata.clone();
        }
        if self.checksum_content.is_none() {
            self.checksum_content = cached.checksum_content.clone();
        }
        if self.crawl_date.is_none() {
            self.crawl_date = cached.crawl_date;
        }
    }
}
