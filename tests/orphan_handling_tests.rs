//! Orphan scenarios spanning several sessions against one store: references
//! cached from a prior run but never re-encountered are deleted, reprocessed,
//! or left alone depending on the configured strategy, and spoiled references
//! with a good history are graced exactly once.

mod common;

use std::sync::Arc;

use common::{
    config, processed_record, processed_references, ImportOutcome, RecordingCommitter,
    StubImporter,
};
use harvest_core::config::{CrawlConfig, OrphansStrategy};
use harvest_core::crawl::CrawlSession;
use harvest_core::doc::DocState;
use harvest_core::store::MemoryStoreEngine;

async fn run_session(
    engine: &MemoryStoreEngine,
    cfg: CrawlConfig,
    importer: Arc<StubImporter>,
    committer: Arc<RecordingCommitter>,
) {
    let session = CrawlSession::builder(cfg, Arc::new(engine.clone()))
        .importer(importer as _)
        .committer(committer as _)
        .build()
        .unwrap();
    session.start().await.unwrap();
}

#[tokio::test]
async fn test_orphans_are_deleted_exactly_once() {
    let engine = MemoryStoreEngine::new();
    let mut cfg = config("orphan-del", &["http://a", "http://b"]);
    cfg.orphans_strategy = OrphansStrategy::Delete;
    run_session(
        &engine,
        cfg.clone(),
        Arc::new(StubImporter::new()),
        Arc::new(RecordingCommitter::new()),
    )
    .await;

    // Second run only re-encounters "a"; "b" becomes an orphan.
    cfg.start_references = vec!["http://a".to_string()];
    let committer = Arc::new(RecordingCommitter::new());
    run_session(
        &engine,
        cfg,
        Arc::new(StubImporter::new()),
        Arc::clone(&committer),
    )
    .await;

    assert_eq!(committer.deleted(), ["http://b"]);
    let record = processed_record(&engine, "orphan-del", "http://b").await.unwrap();
    assert_eq!(record.state, Some(DocState::Deleted));
}

#[tokio::test]
async fn test_ignored_orphans_are_left_alone() {
    let engine = MemoryStoreEngine::new();
    let mut cfg = config("orphan-ign", &["http://a", "http://b"]);
    cfg.orphans_strategy = OrphansStrategy::Ignore;
    run_session(
        &engine,
        cfg.clone(),
        Arc::new(StubImporter::new()),
        Arc::new(RecordingCommitter::new()),
    )
    .await;

    cfg.start_references = vec!["http://a".to_string()];
    let committer = Arc::new(RecordingCommitter::new());
    run_session(
        &engine,
        cfg,
        Arc::new(StubImporter::new()),
        Arc::clone(&committer),
    )
    .await;

    assert!(committer.deleted().is_empty());
    // Processed holds only what this run re-encountered.
    assert_eq!(
        processed_references(&engine, "orphan-ign").await,
        ["http://a"]
    );
}

#[tokio::test]
async fn test_reprocessed_orphans_go_through_the_upsert_path() {
    let engine = MemoryStoreEngine::new();
    let mut cfg = config("orphan-proc", &["http://a", "http://b"]);
    cfg.orphans_strategy = OrphansStrategy::Process;
    run_session(
        &engine,
        cfg.clone(),
        Arc::new(StubImporter::new()),
        Arc::new(RecordingCommitter::new()),
    )
    .await;

    cfg.start_references = vec!["http://a".to_string()];
    let importer = Arc::new(StubImporter::new());
    let committer = Arc::new(RecordingCommitter::new());
    run_session(&engine, cfg, Arc::clone(&importer), Arc::clone(&committer)).await;

    // "b" was re-queued and imported like any other reference.
    assert!(importer.applied.lock().contains(&"http://b".to_string()));
    let mut upserted = committer.upserted();
    upserted.sort();
    assert_eq!(upserted, ["http://a", "http://b"]);
    assert_eq!(
        processed_references(&engine, "orphan-proc").await,
        ["http://a", "http://b"]
    );
}

#[tokio::test]
async fn test_cached_not_found_reference_is_deleted_as_orphan() {
    let engine = MemoryStoreEngine::new();
    let mut cfg = config("orphan-nf", &["http://x"]);
    cfg.orphans_strategy = OrphansStrategy::Delete;
    run_session(
        &engine,
        cfg.clone(),
        Arc::new(
            StubImporter::new()
                .outcome("http://x", ImportOutcome::SuccessWithState(DocState::NotFound)),
        ),
        Arc::new(RecordingCommitter::new()),
    )
    .await;
    let record = processed_record(&engine, "orphan-nf", "http://x").await.unwrap();
    assert_eq!(record.state, Some(DocState::NotFound));

    // "x" is absent from the second run's queue entirely.
    cfg.start_references = Vec::new();
    let committer = Arc::new(RecordingCommitter::new());
    run_session(
        &engine,
        cfg,
        Arc::new(StubImporter::new()),
        Arc::clone(&committer),
    )
    .await;

    assert_eq!(committer.deleted(), ["http://x"]);
    let record = processed_record(&engine, "orphan-nf", "http://x").await.unwrap();
    assert_eq!(record.state, Some(DocState::Deleted));
}

#[tokio::test]
async fn test_spoiled_reference_with_good_history_is_graced_once() {
    let engine = MemoryStoreEngine::new();
    let cfg = config("graced", &["http://a"]);

    // First run: a clean pass.
    run_session(
        &engine,
        cfg.clone(),
        Arc::new(StubImporter::new()),
        Arc::new(RecordingCommitter::new()),
    )
    .await;

    // Second run: the reference spoils, but last run was good, so the
    // default grace-once strategy holds off deletion.
    let committer = Arc::new(RecordingCommitter::new());
    run_session(
        &engine,
        cfg.clone(),
        Arc::new(
            StubImporter::new().outcome("http://a", ImportOutcome::Error("flaky".to_string())),
        ),
        Arc::clone(&committer),
    )
    .await;
    assert!(committer.deleted().is_empty());
    let record = processed_record(&engine, "graced", "http://a").await.unwrap();
    assert_eq!(record.state, Some(DocState::Error));

    // Third run: still spoiled, two consecutive bad runs, deleted.
    let committer = Arc::new(RecordingCommitter::new());
    run_session(
        &engine,
        cfg,
        Arc::new(
            StubImporter::new().outcome("http://a", ImportOutcome::Error("flaky".to_string())),
        ),
        Arc::clone(&committer),
    )
    .await;
    assert_eq!(committer.deleted(), ["http://a"]);
}

#[tokio::test]
async fn test_redirected_reference_is_not_treated_as_an_orphan() {
    let engine = MemoryStoreEngine::new();
    let mut cfg = config("redirect", &["http://new"]);
    cfg.orphans_strategy = OrphansStrategy::Delete;
    let importer = || {
        Arc::new(StubImporter::new().outcome(
            "http://new",
            ImportOutcome::SuccessWithOriginal("http://old".to_string()),
        ))
    };

    run_session(
        &engine,
        cfg.clone(),
        importer(),
        Arc::new(RecordingCommitter::new()),
    )
    .await;
    // Both the normalized and the pre-normalization form count as processed.
    assert_eq!(
        processed_references(&engine, "redirect").await,
        ["http://new", "http://old"]
    );

    let committer = Arc::new(RecordingCommitter::new());
    run_session(&engine, cfg, importer(), Arc::clone(&committer)).await;

    // "http://old" was cached from the first run but must not be deleted.
    assert!(committer.deleted().is_empty());
}
