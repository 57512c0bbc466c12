//! Shared stubs and helpers for crawl integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use harvest_core::config::CrawlConfig;
use harvest_core::doc::{DocRecord, DocState, Document};
use harvest_core::error::{CrawlError, Result};
use harvest_core::pipeline::{CommitSink, ImportPipeline, ImporterResponse};
use harvest_core::store::{MemoryStoreEngine, Store, StoreEngine};

/// Per-reference behavior for the stub import pipeline.
#[derive(Debug, Clone)]
pub enum ImportOutcome {
    /// Successful import with the given child responses.
    Success(Vec<ImporterResponse>),
    /// Pipeline engaged but rejected the document.
    Failure,
    /// Pipeline never engaged (absent response).
    Absent,
    /// Pipeline sets the given state, then succeeds.
    SuccessWithState(DocState),
    /// Successful import of a reference normalized from the given
    /// pre-normalization form.
    SuccessWithOriginal(String),
    /// Pipeline raises an error of the given kind.
    Error(String),
}

/// Import pipeline stub: maps references to canned outcomes; anything
/// unmapped is a plain success marked new.
#[derive(Default)]
pub struct StubImporter {
    outcomes: Mutex<HashMap<String, ImportOutcome>>,
    pub applied: Mutex<Vec<String>>,
}

impl StubImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(self, reference: &str, outcome: ImportOutcome) -> Self {
        self.outcomes
            .lock()
            .insert(reference.to_string(), outcome);
        self
    }
}

#[async_trait]
impl ImportPipeline for StubImporter {
    async fn apply(&self, doc: &mut Document) -> Result<Option<ImporterResponse>> {
        let reference = doc.reference().to_string();
        self.applied.lock().push(reference.clone());
        let outcome = self
            .outcomes
            .lock()
            .get(&reference)
            .cloned()
            .unwrap_or(ImportOutcome::SuccessWithState(DocState::New));
        match outcome {
            ImportOutcome::Success(children) => {
                doc.record.set_state(DocState::New);
                let mut response = ImporterResponse::success(&reference, "imported");
                response.children = children;
                Ok(Some(response))
            }
            ImportOutcome::SuccessWithState(state) => {
                doc.record.set_state(state);
                Ok(Some(ImporterResponse::success(&reference, "imported")))
            }
            ImportOutcome::SuccessWithOriginal(original) => {
                doc.record.set_state(DocState::New);
                doc.record.original_reference = Some(original);
                Ok(Some(ImporterResponse::success(&reference, "imported")))
            }
            ImportOutcome::Failure => {
                doc.record.set_state(DocState::New);
                Ok(Some(ImporterResponse::failure(&reference, "rejected")))
            }
            ImportOutcome::Absent => {
                doc.record.set_state(DocState::New);
                Ok(None)
            }
            ImportOutcome::Error(kind) => Err(CrawlError::processing(kind, "stubbed failure")),
        }
    }
}

/// Commit sink stub recording every upsert, delete, and clean it receives.
#[derive(Default)]
pub struct RecordingCommitter {
    pub upserts: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub cleans: Mutex<u32>,
}

impl RecordingCommitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upserted(&self) -> Vec<String> {
        self.upserts.lock().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }
}

#[async_trait]
impl CommitSink for RecordingCommitter {
    async fn upsert(&self, doc: &Document) -> Result<()> {
        self.upserts.lock().push(doc.reference().to_string());
        Ok(())
    }

    async fn delete(&self, doc: &Document) -> Result<()> {
        self.deletes.lock().push(doc.reference().to_string());
        Ok(())
    }

    async fn clean(&self) -> Result<()> {
        *self.cleans.lock() += 1;
        Ok(())
    }
}

pub fn config(id: &str, start_references: &[&str]) -> CrawlConfig {
    CrawlConfig {
        id: id.to_string(),
        num_threads: 2,
        start_references: start_references.iter().map(|s| s.to_string()).collect(),
        // Periodic progress logging just adds noise at test scale.
        min_progress_logging_interval_ms: 0,
        ..Default::default()
    }
}

/// Open a read view over one of a crawler's ledger tables.
pub async fn ledger_view(
    engine: &MemoryStoreEngine,
    crawler_id: &str,
    table: &str,
) -> Store<DocRecord> {
    Store::new(
        engine
            .open_store(&format!("{crawler_id}.{table}"))
            .await
            .unwrap(),
    )
}

pub async fn processed_references(engine: &MemoryStoreEngine, crawler_id: &str) -> Vec<String> {
    let store = ledger_view(engine, crawler_id, "processed").await;
    let mut refs = Vec::new();
    store
        .for_each(|id, _: DocRecord| {
            refs.push(id.to_string());
            true
        })
        .await
        .unwrap();
    refs.sort();
    refs
}

pub async fn processed_record(
    engine: &MemoryStoreEngine,
    crawler_id: &str,
    reference: &str,
) -> Option<DocRecord> {
    ledger_view(engine, crawler_id, "processed")
        .await
        .find(reference)
        .await
        .unwrap()
}

pub type SharedCommitter = Arc<RecordingCommitter>;
pub type SharedImporter = Arc<StubImporter>;
