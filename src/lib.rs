#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Harvest Core
//!
//! High-performance Rust core for content-ingestion crawl orchestration:
//! a long-running engine that pulls references from a durable queue, drives
//! each through an external fetch → transform → commit pipeline, tracks
//! per-reference lifecycle state across runs, and coordinates multiple
//! cooperating instances through a shared key-value store.
//!
//! ## Architecture
//!
//! The core guarantees at-most-one-active-processing per reference,
//! survives partial failures and restarts (resumable sessions), and stays
//! correct whether zero, one, or many instances run concurrently against
//! the same store - without a dedicated coordination service, using only
//! the store and polling.
//!
//! ## Module Organization
//!
//! - [`doc`] - Document records, states, and the queue/active/cache/processed ledger
//! - [`crawl`] - Session orchestration, worker pool, and the finalize state machine
//! - [`cluster`] - Multi-instance coordination over the shared store
//! - [`store`] - Key-value store engine contract and in-memory implementation
//! - [`pipeline`] - Collaborator contracts (import pipeline, commit sink, spoil strategizer)
//! - [`events`] - Lifecycle event stream and monitoring counters
//! - [`progress`] - Periodic throughput/ETA reporting
//! - [`config`] - Immutable run configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use harvest_core::config::CrawlConfig;
//! use harvest_core::crawl::CrawlSession;
//! use harvest_core::store::MemoryStoreEngine;
//! # use harvest_core::pipeline::{ImportPipeline, CommitSink};
//!
//! # async fn example(importer: Arc<dyn ImportPipeline>, committer: Arc<dyn CommitSink>)
//! # -> Result<(), Box<dyn std::error::Error>> {
//! let config = CrawlConfig {
//!     id: "my-crawler".to_string(),
//!     start_references: vec!["http://example.com/".to_string()],
//!     ..Default::default()
//! };
//! let session = CrawlSession::builder(config, Arc::new(MemoryStoreEngine::new()))
//!     .importer(importer)
//!     .committer(committer)
//!     .build()?;
//! session.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod crawl;
pub mod doc;
pub mod error;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod store;

pub use cluster::{ClusterService, CrawlerState, InstanceHeartbeat};
pub use config::{CrawlConfig, OrphansStrategy};
pub use crawl::{CrawlSession, CrawlSessionBuilder};
pub use doc::{DocContent, DocLedger, DocRecord, DocState, Document};
pub use error::{CrawlError, Result};
pub use events::{CrawlEvent, CrawlEventKind, CrawlerMonitor, EventBus, EventPublisher};
pub use pipeline::{
    CommitSink, GenericSpoiledReferenceStrategizer, ImportPipeline, ImporterResponse,
    SpoilStrategy, SpoiledReferenceStrategizer,
};
pub use progress::ProgressLogger;
pub use store::{MemoryStoreEngine, RawStore, Store, StoreEngine};
