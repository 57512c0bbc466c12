use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordination-level crawler states, shared through the cluster store.
///
/// The type enforces no transition table; transitions are driven by the
/// session orchestrator and the cluster service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlerState {
    Undefined,
    Idle,
    InitDocStores,
    InitQueue,
    Crawling,
    Expired,
    Stopping,
    Stopped,
    Completed,
}

impl CrawlerState {
    /// Whether this state marks an instance that is done running.
    pub fn is_done_running(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::Stopping | Self::Stopped | Self::Completed
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Idle => "IDLE",
            Self::InitDocStores => "INIT_DOC_STORES",
            Self::InitQueue => "INIT_QUEUE",
            Self::Crawling => "CRAWLING",
            Self::Expired => "EXPIRED",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Parse a state read back from the shared store. Absent or unknown
    /// values map to [`CrawlerState::Undefined`].
    pub fn of(name: Option<&str>) -> Self {
        match name {
            Some("IDLE") => Self::Idle,
            Some("INIT_DOC_STORES") => Self::InitDocStores,
            Some("INIT_QUEUE") => Self::InitQueue,
            Some("CRAWLING") => Self::Crawling,
            Some("EXPIRED") => Self::Expired,
            Some("STOPPING") => Self::Stopping,
            Some("STOPPED") => Self::Stopped,
            Some("COMPLETED") => Self::Completed,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for CrawlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
