use std::fmt;

/// Central error type for the crawl orchestration core.
///
/// Per-reference processing failures are represented as [`CrawlError::Processing`]
/// and carry a collaborator-defined `kind` label that the stop-on-error
/// configuration matches against. Store and cluster failures are fatal to the
/// operation that raised them.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlError {
    Store(String),
    Cluster(String),
    ClusterLiveness {
        instance: String,
        state: String,
        elapsed_ms: u64,
    },
    Processing {
        kind: String,
        message: String,
    },
    Event(String),
    Configuration(String),
    State(String),
}

impl CrawlError {
    /// Build a per-reference processing error with a collaborator-defined kind.
    pub fn processing(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processing {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Stable label used by the stop-on-error configuration to match errors.
    ///
    /// Processing errors match on their collaborator-defined kind; every other
    /// variant matches on its own name.
    pub fn kind(&self) -> &str {
        match self {
            Self::Store(_) => "store",
            Self::Cluster(_) => "cluster",
            Self::ClusterLiveness { .. } => "cluster_liveness",
            Self::Processing { kind, .. } => kind,
            Self::Event(_) => "event",
            Self::Configuration(_) => "configuration",
            Self::State(_) => "state",
        }
    }
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlError::Store(msg) => write!(f, "Store error: {msg}"),
            CrawlError::Cluster(msg) => write!(f, "Cluster error: {msg}"),
            CrawlError::ClusterLiveness {
                instance,
                state,
                elapsed_ms,
            } => write!(
                f,
                "Instance {instance} doing '{state}' gave no sign of life for too long \
                 ({elapsed_ms}ms since last heartbeat)"
            ),
            CrawlError::Processing { kind, message } => {
                write!(f, "Processing error ({kind}): {message}")
            }
            CrawlError::Event(msg) => write!(f, "Event error: {msg}"),
            CrawlError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            CrawlError::State(msg) => write!(f, "State error: {msg}"),
        }
    }
}

impl std::error::Error for CrawlError {}

pub type Result<T> = std::result::Result<T, CrawlError>;
