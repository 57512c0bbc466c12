use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of lifecycle events emitted by the crawl core.
///
/// A single tagged union replaces an open-ended listener class hierarchy:
/// consumers subscribe once and pattern-match on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlEventKind {
    CrawlerInitBegin,
    CrawlerInitEnd,
    CrawlerRunBegin,
    CrawlerRunEnd,
    CrawlerRunThreadBegin,
    CrawlerRunThreadEnd,
    CrawlerStopBegin,
    CrawlerStopEnd,
    CrawlerCleanBegin,
    CrawlerCleanEnd,
    CrawlerError,
    DocumentQueued,
    DocumentImported,
    DocumentCommittedUpsert,
    DocumentCommittedDelete,
    DocumentProcessed,
    RejectedFilter,
    RejectedUnmodified,
    RejectedDuplicate,
    RejectedPremature,
    RejectedNotFound,
    RejectedBadStatus,
    RejectedTooDeep,
    RejectedImport,
    RejectedError,
}

impl CrawlEventKind {
    /// Stable event name exposed to listeners.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CrawlerInitBegin => "CRAWLER_INIT_BEGIN",
            Self::CrawlerInitEnd => "CRAWLER_INIT_END",
            Self::CrawlerRunBegin => "CRAWLER_RUN_BEGIN",
            Self::CrawlerRunEnd => "CRAWLER_RUN_END",
            Self::CrawlerRunThreadBegin => "CRAWLER_RUN_THREAD_BEGIN",
            Self::CrawlerRunThreadEnd => "CRAWLER_RUN_THREAD_END",
            Self::CrawlerStopBegin => "CRAWLER_STOP_BEGIN",
            Self::CrawlerStopEnd => "CRAWLER_STOP_END",
            Self::CrawlerCleanBegin => "CRAWLER_CLEAN_BEGIN",
            Self::CrawlerCleanEnd => "CRAWLER_CLEAN_END",
            Self::CrawlerError => "CRAWLER_ERROR",
            Self::DocumentQueued => "DOCUMENT_QUEUED",
            Self::DocumentImported => "DOCUMENT_IMPORTED",
            Self::DocumentCommittedUpsert => "DOCUMENT_COMMITTED_UPSERT",
            Self::DocumentCommittedDelete => "DOCUMENT_COMMITTED_DELETE",
            Self::DocumentProcessed => "DOCUMENT_PROCESSED",
            Self::RejectedFilter => "REJECTED_FILTER",
            Self::RejectedUnmodified => "REJECTED_UNMODIFIED",
            Self::RejectedDuplicate => "REJECTED_DUPLICATE",
            Self::RejectedPremature => "REJECTED_PREMATURE",
            Self::RejectedNotFound => "REJECTED_NOTFOUND",
            Self::RejectedBadStatus => "REJECTED_BAD_STATUS",
            Self::RejectedTooDeep => "REJECTED_TOO_DEEP",
            Self::RejectedImport => "REJECTED_IMPORT",
            Self::RejectedError => "REJECTED_ERROR",
        }
    }

    /// Whether this event reports a rejected reference.
    pub fn is_rejection(&self) -> bool {
        self.name().starts_with("REJECTED_")
    }
}

impl fmt::Display for CrawlEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One lifecycle event, as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlEvent {
    pub kind: CrawlEventKind,
    /// Reference of the document this event concerns, when applicable.
    pub reference: Option<String>,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl CrawlEvent {
    pub fn new(kind: CrawlEventKind) -> Self {
        Self {
            kind,
            reference: None,
            message: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn for_reference(kind: CrawlEventKind, reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Self::new(kind)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
