//! # Document Model
//!
//! Records, states, and the ledger tracking every reference through the
//! queue → active → processed lifecycle across runs.

pub mod document;
pub mod ledger;
pub mod record;
pub mod state;

pub use document::{DocContent, Document};
pub use ledger::DocLedger;
pub use record::DocRecord;
pub use state::DocState;
