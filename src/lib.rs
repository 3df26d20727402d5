//! DeepBook read-only query layer
//!
//! Composes DeepBook view calls as programmable transactions, dry-runs them
//! against a full node or a local Move VM, and decodes the BCS results into
//! normalized values.

pub mod api;
pub mod codec;
pub mod config;
pub mod metrics;
pub mod ptb;
pub mod query;
pub mod sandbox;
pub mod types;
