//! Multi-instance coordination over a shared store: claim exclusivity, the
//! all-instances barrier, liveness-timeout detection, and a clustered
//! end-to-end session.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{config, processed_references, RecordingCommitter, StubImporter};
use harvest_core::cluster::{ClusterService, CrawlerState, InstanceHeartbeat};
use harvest_core::config::CrawlConfig;
use harvest_core::crawl::CrawlSession;
use harvest_core::error::CrawlError;
use harvest_core::store::{MemoryStoreEngine, Store, StoreEngine};

fn clustered_config(id: &str) -> CrawlConfig {
    CrawlConfig {
        id: id.to_string(),
        cluster_enabled: true,
        cluster_inquire_interval_ms: Some(10),
        cluster_inform_interval_ms: Some(50),
        min_progress_logging_interval_ms: 0,
        ..Default::default()
    }
}

async fn open_service(
    engine: &MemoryStoreEngine,
    cfg: &CrawlConfig,
    instance_id: &str,
) -> ClusterService {
    ClusterService::open(engine, cfg, instance_id).await.unwrap()
}

#[tokio::test]
async fn test_single_instance_task_runs_on_exactly_one_instance() {
    let engine = MemoryStoreEngine::new();
    let cfg = clustered_config("excl");
    let runs = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for name in ["node-a", "node-b", "node-c"] {
        let service = open_service(&engine, &cfg, name).await;
        service.start();
        let runs = Arc::clone(&runs);
        handles.push(tokio::spawn(async move {
            let chosen = service
                .on_single_instance(CrawlerState::InitQueue, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            service.shutdown().await;
            chosen
        }));
    }

    // Wait until both losers advertise IDLE (which they only do after a
    // failed claim) and the winner has run, then move the shared state along
    // to release the waiters, as the next session phase would.
    let heartbeats: Store<InstanceHeartbeat> =
        Store::new(engine.open_store("excl.instance-heartbeats").await.unwrap());
    let releaser = open_service(&engine, &cfg, "node-release").await;
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let mut idle = 0;
            heartbeats
                .for_each(|_, hb: InstanceHeartbeat| {
                    if hb.state == CrawlerState::Idle {
                        idle += 1;
                    }
                    true
                })
                .await
                .unwrap();
            if idle == 2 && runs.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("not all instances attempted the claim");
    releaser
        .set_cluster_state(CrawlerState::Crawling)
        .await
        .unwrap();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_instances_barrier_runs_the_task_everywhere() {
    let engine = MemoryStoreEngine::new();
    let cfg = clustered_config("barrier");
    let runs = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for name in ["node-a", "node-b"] {
        let service = open_service(&engine, &cfg, name).await;
        service.start();
        // Make the instance known to its sibling before the barrier starts.
        service.advertise_state(CrawlerState::Idle).await.unwrap();
        let runs = Arc::clone(&runs);
        handles.push(tokio::spawn(async move {
            let result = service
                .on_all_instances(CrawlerState::Crawling, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            service.shutdown().await;
            result
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_waiters_detect_a_dead_responsible_instance() {
    let engine = MemoryStoreEngine::new();
    let mut cfg = clustered_config("dead-claim");
    cfg.cluster_inform_interval_ms = Some(10);

    // "node-b" claims the phase, then dies: its heartbeat is written once and
    // never refreshed.
    let dead = open_service(&engine, &cfg, "node-b").await;
    assert!(dead
        .set_cluster_state(CrawlerState::InitQueue)
        .await
        .unwrap());
    dead.advertise_state(CrawlerState::InitQueue).await.unwrap();

    let waiter = open_service(&engine, &cfg, "node-a").await;
    let runs = Arc::new(AtomicU32::new(0));
    let task_runs = Arc::clone(&runs);
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        waiter.on_single_instance(CrawlerState::InitQueue, || async move {
            task_runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    )
    .await
    .expect("liveness detection never fired");

    assert_eq!(
        runs.load(Ordering::SeqCst),
        0,
        "the waiting instance must not run the task"
    );
    match result {
        Err(CrawlError::ClusterLiveness {
            instance, state, ..
        }) => {
            assert_eq!(instance, "node-b");
            assert_eq!(state, "INIT_QUEUE");
        }
        other => panic!("Expected a liveness error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_barrier_aborts_when_an_instance_stops_heartbeating() {
    let engine = MemoryStoreEngine::new();
    let mut cfg = clustered_config("dead-barrier");
    cfg.cluster_inform_interval_ms = Some(10);

    // A sibling that entered the phase 10 seconds ago and went silent.
    let heartbeats: Store<InstanceHeartbeat> = Store::new(
        engine
            .open_store("dead-barrier.instance-heartbeats")
            .await
            .unwrap(),
    );
    heartbeats
        .save(
            "node-dead",
            &InstanceHeartbeat {
                state: CrawlerState::Crawling,
                timestamp: Utc::now() - chrono::Duration::seconds(10),
            },
        )
        .await
        .unwrap();

    let service = open_service(&engine, &cfg, "node-a").await;
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        service.on_all_instances(CrawlerState::Crawling, || async { Ok(()) }),
    )
    .await
    .expect("liveness detection never fired");

    match result {
        Err(CrawlError::ClusterLiveness { instance, .. }) => {
            assert_eq!(instance, "node-dead");
        }
        other => panic!("Expected a liveness error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_clustered_session_completes_and_records_final_state() {
    let engine = MemoryStoreEngine::new();
    let mut cfg = config("clu", &["http://a", "http://b"]);
    cfg.cluster_enabled = true;
    cfg.instance_id = Some("node-solo".to_string());
    cfg.cluster_inquire_interval_ms = Some(10);
    cfg.cluster_inform_interval_ms = Some(50);

    let session = CrawlSession::builder(cfg, Arc::new(engine.clone()))
        .importer(Arc::new(StubImporter::new()) as _)
        .committer(Arc::new(RecordingCommitter::new()) as _)
        .build()
        .unwrap();
    session.start().await.unwrap();

    assert_eq!(
        processed_references(&engine, "clu").await,
        ["http://a", "http://b"]
    );
    // The final shared state releases any instance still polling a phase.
    let state_store: Store<String> =
        Store::new(engine.open_store("clu.cluster-state").await.unwrap());
    assert_eq!(
        state_store.find("state").await.unwrap().as_deref(),
        Some("COMPLETED")
    );
}
