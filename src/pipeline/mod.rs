//! # Collaborator Contracts
//!
//! Narrow interfaces the crawl core drives: the fetch/transform import
//! pipeline, the commit sink, and the spoiled-reference strategizer. The
//! core never looks behind these contracts.

pub mod committer;
pub mod importer;
pub mod spoil;

pub use committer::CommitSink;
pub use importer::{ImportPipeline, ImporterResponse};
pub use spoil::{GenericSpoiledReferenceStrategizer, SpoilStrategy, SpoiledReferenceStrategizer};
