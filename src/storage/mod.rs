//! Group storage primitives consumed by the lookup operator.
//!
//! Hierarchical keys, group schema metadata, rows, the group cursor contract,
//! and an in-memory group store implementing it.

/// Hierarchical keys and key values.
pub mod hkey;

/// Group cursor and store adapter traits.
pub mod cursor;

/// In-memory group store.
pub mod memory;

mod metrics;
mod row;
mod schema;

pub use cursor::{GroupCursor, StoreAdapter};
pub use hkey::{HKey, HKeySegment, Value};
pub use memory::{MemoryGroupCursor, MemoryGroupStore};

/// Metrics for sub-cursor activity.
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, StorageMetrics};

pub use row::{HeldRow, Row};
pub use schema::{Group, GroupBuilder, RowType, RowTypeDisplay, Table};
