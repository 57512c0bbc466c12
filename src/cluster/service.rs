//! # Cluster Coordination Service
//!
//! Synchronizes sibling orchestrator instances through two shared tables:
//! `cluster-state` (a single key holding the phase every instance should be
//! in) and `instance-heartbeats` (per-instance `{state, timestamp}` records
//! refreshed by the inform loop).
//!
//! Two primitives are built on top: single-instance task execution, where
//! exactly one instance claims the phase and the rest wait for the shared
//! state to move on, and all-instances barrier execution. Claims ride on the
//! store's upsert-returns-changed semantics; where a store cannot answer
//! that atomically, exclusivity degrades to best-effort last-write-wins.
//! There is no leader election and no quorum - liveness is detected purely
//! by heartbeat age.

use chrono::Utc;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::heartbeat::InstanceHeartbeat;
use super::interval::IntervalRunner;
use super::state::CrawlerState;
use crate::config::{
    CrawlConfig, DEFAULT_CLUSTER_INFORM_INTERVAL_MS, DEFAULT_CLUSTER_INQUIRE_INTERVAL_MS,
    LOCAL_POLL_INTERVAL_MS,
};
use crate::error::{CrawlError, Result};
use crate::store::{Store, StoreEngine};

const CLUSTER_STATE_KEY: &str = "state";
/// An instance silent for this many inform intervals is presumed dead.
const LIVENESS_TIMEOUT_FACTOR: u32 = 4;
/// Heartbeats are scanned for stalled instances every Nth wait poll.
const LIVENESS_CHECK_EVERY_POLLS: u64 = 10;

pub struct ClusterService {
    crawler_id: String,
    instance_id: String,
    cluster_store: Store<String>,
    instances_store: Store<InstanceHeartbeat>,
    inquire_interval: Duration,
    inform_interval: Duration,
    liveness_timeout: Duration,
    /// Shared cluster state as last observed by the inquire loop.
    observed_cluster_state: Arc<RwLock<CrawlerState>>,
    /// This instance's advertised state, written out by the inform loop.
    instance_state: Arc<RwLock<CrawlerState>>,
    inquire_runner: IntervalRunner,
    inform_runner: IntervalRunner,
}

impl ClusterService {
    /// Open the shared coordination tables for one instance.
    pub async fn open(
        engine: &dyn StoreEngine,
        config: &CrawlConfig,
        instance_id: &str,
    ) -> Result<Self> {
        let cluster_store = Store::new(
            engine
                .open_store(&format!("{}.cluster-state", config.id))
                .await?,
        );
        let instances_store = Store::new(
            engine
                .open_store(&format!("{}.instance-heartbeats", config.id))
                .await?,
        );

        let inquire_interval = runner_interval(
            config.cluster_inquire_interval(),
            Duration::from_millis(DEFAULT_CLUSTER_INQUIRE_INTERVAL_MS),
            engine.cluster_friendly(),
        );
        let inform_interval = runner_interval(
            config.cluster_inform_interval(),
            Duration::from_millis(DEFAULT_CLUSTER_INFORM_INTERVAL_MS),
            engine.cluster_friendly(),
        );

        Ok(Self {
            crawler_id: config.id.clone(),
            instance_id: instance_id.to_string(),
            cluster_store,
            instances_store,
            inquire_interval,
            inform_interval,
            liveness_timeout: inform_interval * LIVENESS_TIMEOUT_FACTOR,
            observed_cluster_state: Arc::new(RwLock::new(CrawlerState::Undefined)),
            instance_state: Arc::new(RwLock::new(CrawlerState::Undefined)),
            inquire_runner: IntervalRunner::new(inquire_interval),
            inform_runner: IntervalRunner::new(inform_interval),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn liveness_timeout(&self) -> Duration {
        self.liveness_timeout
    }

    /// Start the inquire (read shared state) and inform (write heartbeat)
    /// loops.
    pub fn start(&self) {
        // <- Keep in sync with the global cluster state.
        let store = self.cluster_store.clone();
        let observed = Arc::clone(&self.observed_cluster_state);
        let crawler_id = self.crawler_id.clone();
        self.inquire_runner.start(move || {
            let store = store.clone();
            let observed = Arc::clone(&observed);
            let crawler_id = crawler_id.clone();
            async move {
                let Ok(value) = store.find(CLUSTER_STATE_KEY).await else {
                    return;
                };
                let current = CrawlerState::of(value.as_deref());
                let previous = {
                    let mut observed = observed.write();
                    std::mem::replace(&mut *observed, current)
                };
                if previous != current {
                    react_to_cluster_state_change(&crawler_id, previous, current);
                }
            }
        });

        // -> Tell others what we are up to once in a while so they know we
        // are alive.
        let store = self.instances_store.clone();
        let state = Arc::clone(&self.instance_state);
        let instance_id = self.instance_id.clone();
        self.inform_runner.start(move || {
            let store = store.clone();
            let state = Arc::clone(&state);
            let instance_id = instance_id.clone();
            async move {
                let heartbeat = InstanceHeartbeat::now(*state.read());
                let _ = store.save(&instance_id, &heartbeat).await;
            }
        });
    }

    pub async fn shutdown(&self) {
        self.inquire_runner.stop().await;
        self.inform_runner.stop().await;
    }

    /// Write the shared cluster state; returns whether this write changed it
    /// (i.e. whether this instance's claim won).
    pub async fn set_cluster_state(&self, state: CrawlerState) -> Result<bool> {
        self.cluster_store
            .save(CLUSTER_STATE_KEY, &state.name().to_string())
            .await
    }

    /// Read the shared cluster state directly from the store.
    pub async fn cluster_state(&self) -> Result<CrawlerState> {
        let value = self.cluster_store.find(CLUSTER_STATE_KEY).await?;
        Ok(CrawlerState::of(value.as_deref()))
    }

    /// Set this instance's advertised state and push a heartbeat right away
    /// rather than waiting for the next inform tick.
    pub async fn advertise_state(&self, state: CrawlerState) -> Result<()> {
        *self.instance_state.write() = state;
        self.instances_store
            .save(&self.instance_id, &InstanceHeartbeat::now(state))
            .await?;
        Ok(())
    }

    /// Execute `task` on a single instance of this crawler.
    ///
    /// The executing instance carries `state` while the others are marked
    /// IDLE and wait for the shared state to change away from `state`.
    /// Returns whether this instance was the one that ran the task.
    #[instrument(skip(self, task), fields(crawler_id = %self.crawler_id, instance_id = %self.instance_id))]
    pub async fn on_single_instance<F, Fut>(&self, state: CrawlerState, task: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let chosen = self.set_cluster_state(state).await?;
        if chosen {
            info!("⚡ CLUSTER: Claimed state {state}; executing here.");
            self.advertise_state(state).await?;
            task().await?;
            Ok(true)
        } else {
            info!("⏳ CLUSTER: Waiting for another instance to execute state {state}.");
            self.advertise_state(CrawlerState::Idle).await?;
            self.wait_until_cluster_state_change(state).await?;
            Ok(false)
        }
    }

    /// Execute `task` on all instances of this crawler, then block until
    /// every instance's heartbeat has moved off `state` (barrier).
    #[instrument(skip(self, task), fields(crawler_id = %self.crawler_id, instance_id = %self.instance_id))]
    pub async fn on_all_instances<F, Fut>(&self, state: CrawlerState, task: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.set_cluster_state(state).await?;
        self.advertise_state(state).await?;
        let task_result = task().await;
        // Go idle before propagating a task failure so siblings are not left
        // waiting on our stale state.
        self.advertise_state(CrawlerState::Idle).await?;
        task_result?;
        info!("⏳ CLUSTER: Waiting for all instances to be done with state {state}.");
        self.wait_until_instances_left_state(state).await
    }

    /// Poll the shared state until it changes away from `original`. Every
    /// few polls, verify the responsible instance is still heartbeating.
    async fn wait_until_cluster_state_change(&self, original: CrawlerState) -> Result<()> {
        let mut polls: u64 = 0;
        loop {
            tokio::time::sleep(self.inquire_interval).await;
            let current = self.cluster_state().await?;
            *self.observed_cluster_state.write() = current;
            if current != original {
                debug!(crawler_id = %self.crawler_id, "Cluster state moved from {original} to {current}.");
                return Ok(());
            }
            polls += 1;
            // Once in a while, check the responsible instance is still doing
            // its job.
            if polls % LIVENESS_CHECK_EVERY_POLLS == 0 {
                self.ensure_responsible_instance_alive(original).await?;
            }
        }
    }

    async fn ensure_responsible_instance_alive(&self, state: CrawlerState) -> Result<()> {
        let now = Utc::now();
        let timeout = self.liveness_timeout;
        let mut stalled: Option<(String, InstanceHeartbeat)> = None;
        self.instances_store
            .for_each(|id, heartbeat: InstanceHeartbeat| {
                if heartbeat.state == state {
                    if heartbeat.has_expired_at(now, timeout) {
                        stalled = Some((id.to_string(), heartbeat));
                    }
                    return false;
                }
                true
            })
            .await?;
        match stalled {
            Some((instance, heartbeat)) => Err(CrawlError::ClusterLiveness {
                instance,
                state: state.name().to_string(),
                elapsed_ms: heartbeat.silence_ms(now),
            }),
            None => Ok(()),
        }
    }

    /// Poll the heartbeat table until no instance still advertises `state`.
    /// Any instance silent past the liveness timeout aborts the wait.
    async fn wait_until_instances_left_state(&self, state: CrawlerState) -> Result<()> {
        loop {
            let now = Utc::now();
            let timeout = self.liveness_timeout;
            let mut expired: Option<(String, InstanceHeartbeat)> = None;
            let mut all_done = true;
            self.instances_store
                .for_each(|id, heartbeat: InstanceHeartbeat| {
                    if heartbeat.has_expired_at(now, timeout) {
                        expired = Some((id.to_string(), heartbeat));
                        return false;
                    }
                    if heartbeat.state == state {
                        all_done = false;
                        return false;
                    }
                    true
                })
                .await?;
            if let Some((instance, heartbeat)) = expired {
                return Err(CrawlError::ClusterLiveness {
                    instance,
                    state: heartbeat.state.name().to_string(),
                    elapsed_ms: heartbeat.silence_ms(now),
                });
            }
            if all_done {
                return Ok(());
            }
            tokio::time::sleep(self.inquire_interval).await;
        }
    }
}

impl std::fmt::Debug for ClusterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterService")
            .field("crawler_id", &self.crawler_id)
            .field("instance_id", &self.instance_id)
            .field("inquire_interval", &self.inquire_interval)
            .field("inform_interval", &self.inform_interval)
            .finish()
    }
}

fn react_to_cluster_state_change(crawler_id: &str, old: CrawlerState, new: CrawlerState) {
    // Hook for future reactions (e.g. a cluster-wide stop request);
    // currently informational.
    debug!(crawler_id = %crawler_id, "Cluster state changed: {old} -> {new}");
}

/// Poll cadence: explicit configuration wins; otherwise a tight local loop
/// for process-local stores and the cluster default for shared ones.
fn runner_interval(
    configured: Option<Duration>,
    cluster_default: Duration,
    cluster_friendly: bool,
) -> Duration {
    if let Some(interval) = configured {
        return interval;
    }
    if cluster_friendly {
        cluster_default
    } else {
        Duration::from_millis(LOCAL_POLL_INTERVAL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStoreEngine;

    fn clustered_config(id: &str) -> CrawlConfig {
        CrawlConfig {
            id: id.to_string(),
            cluster_enabled: true,
            cluster_inquire_interval_ms: Some(10),
            cluster_inform_interval_ms: Some(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_runner_interval_selection() {
        let default = Duration::from_secs(5);
        assert_eq!(
            runner_interval(Some(Duration::from_millis(7)), default, false),
            Duration::from_millis(7)
        );
        assert_eq!(runner_interval(None, default, true), default);
        assert_eq!(runner_interval(None, default, false), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_claim_goes_to_exactly_one_writer() {
        let engine = MemoryStoreEngine::new();
        let config = clustered_config("c1");
        let a = ClusterService::open(&engine, &config, "node-a").await.unwrap();
        let b = ClusterService::open(&engine, &config, "node-b").await.unwrap();

        assert!(a.set_cluster_state(CrawlerState::InitQueue).await.unwrap());
        assert!(!b.set_cluster_state(CrawlerState::InitQueue).await.unwrap());
        assert_eq!(b.cluster_state().await.unwrap(), CrawlerState::InitQueue);
    }

    #[tokio::test]
    async fn test_liveness_timeout_is_four_inform_intervals() {
        let engine = MemoryStoreEngine::new();
        let mut config = clustered_config("c2");
        config.cluster_inform_interval_ms = Some(100);
        let service = ClusterService::open(&engine, &config, "node-a").await.unwrap();
        assert_eq!(service.liveness_timeout(), Duration::from_millis(400));
    }
}
