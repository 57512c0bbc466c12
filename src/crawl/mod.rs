//! # Crawl Orchestration
//!
//! The session orchestrator, the concurrent worker pool draining the queue,
//! the per-document upsert/delete/finalize state machine, and orphan
//! handling.

pub mod context;
pub mod orphans;
pub mod process;
pub mod session;
pub mod worker;

pub use context::CrawlContext;
pub use session::{CrawlSession, CrawlSessionBuilder};
