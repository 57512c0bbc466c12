use crate::error::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default cadence for the cluster inquire loop when the backing store is
/// built for multi-instance sharing.
pub const DEFAULT_CLUSTER_INQUIRE_INTERVAL_MS: u64 = 5_000;
/// Default cadence for the cluster inform (heartbeat) loop when the backing
/// store is built for multi-instance sharing.
pub const DEFAULT_CLUSTER_INFORM_INTERVAL_MS: u64 = 5_000;
/// Tight poll cadence used when the backing store is process-local.
pub const LOCAL_POLL_INTERVAL_MS: u64 = 50;

/// What to do with references found in last run's cache but never
/// re-encountered during the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphansStrategy {
    /// Re-queue orphans through the normal upsert path.
    Process,
    /// Queue orphans for deletion through the commit sink.
    Delete,
    /// Leave orphans alone.
    Ignore,
}

impl fmt::Display for OrphansStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Delete => write!(f, "delete"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for OrphansStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "delete" => Ok(Self::Delete),
            "ignore" => Ok(Self::Ignore),
            _ => Err(format!("Invalid orphans strategy: {s}")),
        }
    }
}

/// Immutable crawl run configuration.
///
/// Constructed once before a session starts and shared read-only with every
/// component; nothing mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Crawler identity. Store table names and cluster keys are namespaced
    /// under it, so two crawlers can share one engine without colliding.
    pub id: String,
    /// Stable identity of this orchestrator instance within the cluster.
    /// Generated (uuid v4) when absent; supply one to make sessions
    /// resumable across restarts.
    pub instance_id: Option<String>,
    /// Number of concurrent workers draining the queue.
    pub num_threads: usize,
    /// Maximum documents to process this session; -1 means unbounded.
    /// On resume, the cap is raised by the already-processed count.
    pub max_documents: i64,
    /// Maximum nesting depth accepted for child documents; -1 means unbounded.
    pub max_depth: i64,
    /// References seeded into the queue at session start.
    pub start_references: Vec<String>,
    pub orphans_strategy: OrphansStrategy,
    /// Attempt to resume a previously interrupted session.
    pub resume: bool,
    /// Minimum interval between progress log lines, in milliseconds.
    /// Zero disables periodic progress logging.
    pub min_progress_logging_interval_ms: u64,
    /// How long a worker may sit idle (queue empty, others active) before
    /// shutting itself down, in milliseconds. Zero means no idle timeout.
    pub idle_timeout_ms: u64,
    /// Error kinds (see `CrawlError::kind`) that escalate a per-reference
    /// failure into a pool-wide stop.
    pub stop_on_errors: Vec<String>,
    /// Whether this instance coordinates with siblings through the shared
    /// store.
    pub cluster_enabled: bool,
    /// Cluster state poll interval override, in milliseconds.
    pub cluster_inquire_interval_ms: Option<u64>,
    /// Heartbeat write interval override, in milliseconds.
    pub cluster_inform_interval_ms: Option<u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            id: "crawler".to_string(),
            instance_id: None,
            num_threads: 2,
            max_documents: -1,
            max_depth: -1,
            start_references: Vec::new(),
            orphans_strategy: OrphansStrategy::Process,
            resume: true,
            min_progress_logging_interval_ms: 30_000,
            idle_timeout_ms: 0,
            stop_on_errors: Vec::new(),
            cluster_enabled: false,
            cluster_inquire_interval_ms: None,
            cluster_inform_interval_ms: None,
        }
    }
}

impl CrawlConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("HARVEST_CRAWLER_ID") {
            config.id = id;
        }

        if let Ok(instance_id) = std::env::var("HARVEST_INSTANCE_ID") {
            config.instance_id = Some(instance_id);
        }

        if let Ok(num_threads) = std::env::var("HARVEST_NUM_THREADS") {
            config.num_threads = num_threads.parse().map_err(|e| {
                CrawlError::Configuration(format!("Invalid num_threads: {e}"))
            })?;
        }

        if let Ok(max_documents) = std::env::var("HARVEST_MAX_DOCUMENTS") {
            config.max_documents = max_documents.parse().map_err(|e| {
                CrawlError::Configuration(format!("Invalid max_documents: {e}"))
            })?;
        }

        if let Ok(strategy) = std::env::var("HARVEST_ORPHANS_STRATEGY") {
            config.orphans_strategy = strategy
                .parse()
                .map_err(CrawlError::Configuration)?;
        }

        if let Ok(cluster) = std::env::var("HARVEST_CLUSTER_ENABLED") {
            config.cluster_enabled = cluster == "1" || cluster.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }

    pub fn min_progress_logging_interval(&self) -> Option<Duration> {
        match self.min_progress_logging_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn cluster_inquire_interval(&self) -> Option<Duration> {
        self.cluster_inquire_interval_ms.map(Duration::from_millis)
    }

    pub fn cluster_inform_interval(&self) -> Option<Duration> {
        self.cluster_inform_interval_ms.map(Duration::from_millis)
    }
}
