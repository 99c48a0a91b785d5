#![forbid(unsafe_code)]

//! Identifiers and the error type shared by every layer of the crate.

use std::fmt;

/// Position of a table inside its group's table arena.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TableId(pub u32);

/// Ordinal written into hierarchical keys to tag the table a key segment belongs to.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Ordinal(pub u32);

/// Identity of one parameter context produced by a bindings provider.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct BindingsId(pub u64);

/// Errors raised while building or running a group lookup.
#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    /// Invalid operator arguments, detected at construction time.
    #[error("invalid lookup configuration: {0}")]
    Config(String),
    /// A row was asked for the hkey of a table that is not one of its ancestors.
    #[error("table {0} is not an ancestor of the row")]
    NotAncestor(String),
    /// A cursor operation was invoked outside the allowed lifecycle sequence.
    #[error("cursor lifecycle violation: {0}")]
    Lifecycle(&'static str),
    /// The query was cancelled through its cancel token.
    #[error("query cancelled")]
    Cancelled,
    /// Failure reported by the backing store.
    #[error("storage: {0}")]
    Storage(String),
}

impl LookupError {
    /// Returns `true` when the error is the cooperative cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LookupError::Cancelled)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LookupError>;

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BindingsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Ordinal {
    fn from(value: u32) -> Self {
        Ordinal(value)
    }
}

impl From<Ordinal> for u32 {
    fn from(value: Ordinal) -> Self {
        value.0
    }
}
