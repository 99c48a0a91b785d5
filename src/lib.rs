//! Hierarchical group lookup for a pull-based query executor.
//!
//! Rows of a table group are stored in hierarchical-key order, so every
//! ancestor of a row is a point lookup and every descendant subtree is a
//! contiguous range. [`query::GroupLookup`] expands each input row into its
//! requested ancestors and descendants, either one row at a time or with a
//! bounded number of lookups kept open ahead of the consumer.

#![warn(missing_docs)]

pub mod config;
pub mod query;
pub mod storage;
pub mod types;

pub use config::{ConfigError, LookupConfig};
pub use query::{GroupLookup, InputPreservation, QueryBindings, QueryContext};
pub use types::{LookupError, Result};
