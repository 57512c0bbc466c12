//! # Cluster Coordination
//!
//! Best-effort, store-mediated coordination between sibling orchestrator
//! instances: no external consensus service, only a shared key-value store
//! and polling.

pub mod heartbeat;
pub mod interval;
pub mod service;
pub mod state;

pub use heartbeat::InstanceHeartbeat;
pub use interval::IntervalRunner;
pub use service::ClusterService;
pub use state::CrawlerState;
