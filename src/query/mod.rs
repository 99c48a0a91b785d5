#![forbid(unsafe_code)]

//! Pull-based query execution.
//!
//! Operators build cursors over their inputs; cursors iterate rows once per
//! parameter context delivered by a bindings provider.

/// Parameter contexts and the per-query execution context.
///
/// Carries the store adapter, settings, cancel token and metrics sink shared
/// by every cursor of a query.
pub mod bindings;

/// Cursor, bindings provider and operator contracts.
pub mod cursor;

/// Group lookup operator and its serial and lookahead executions.
pub mod lookup;

/// Lookup metrics and profiling counters.
pub mod profile;

/// Leaf operator producing rows per context.
pub mod values;

pub use bindings::{QueryBindings, QueryContext};
pub use cursor::{drain_cursor, BindingsCursor, BindingsList, Cursor, CursorState, Operator};
pub use lookup::{GroupLookup, InputPreservation, LookupExplain, LookupPlan};
pub use profile::{CounterLookupMetrics, LookupMetrics, LookupProfileSnapshot, NoopLookupMetrics};
pub use values::ValuesScan;
