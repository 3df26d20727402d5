//! Read-only DeepBook queries
//!
//! [`DeepBookQuery`] composes one view call per operation, dry-runs it through
//! a [`crate::sandbox::Simulator`], and decodes the return slots into
//! human-scale values.

pub mod client;
mod error;
pub mod normalize;
pub mod registry;
pub mod types;

pub use client::DeepBookQuery;
pub use error::{parse_abort_code, QueryError, QueryResult};
pub use registry::{AccountRegistry, TradingAccount};
