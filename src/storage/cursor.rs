use std::sync::Arc;

use crate::types::Result;

use super::hkey::HKey;
use super::row::Row;
use super::schema::Group;

/// Positioned access to the rows of one group, keyed by hierarchical key.
///
/// A cursor is rebound to a target key, opened, iterated and closed; it may be
/// rebound and reopened any number of times until it is destroyed.
pub trait GroupCursor {
    /// Repositions the cursor.
    ///
    /// With `deep == false` the cursor performs a point lookup: it yields at
    /// most one row, the first stored row at or after `hkey` inside the subtree
    /// addressed by `hkey`. Callers compare that row's key against `hkey`
    /// because the exact row may be missing. With `deep == true` it yields every
    /// row of the subtree in ascending key order.
    fn rebind(&mut self, hkey: &HKey, deep: bool);

    /// Opens the cursor at its bound position.
    fn open(&mut self) -> Result<()>;

    /// Returns the next row, or `None` at the end of the bound range.
    fn next(&mut self) -> Result<Option<Arc<Row>>>;

    /// Releases the cursor's position. Closing a closed cursor is a no-op.
    fn close(&mut self);

    /// Releases everything; the cursor must not be used afterwards.
    fn destroy(&mut self);

    /// Returns `true` between `open` and `close`.
    fn is_open(&self) -> bool;
}

/// Factory for group cursors, supplied to operators through the query context.
pub trait StoreAdapter: Send + Sync {
    /// Creates a new, unbound cursor over `group`.
    fn new_group_cursor(&self, group: &Group) -> Result<Box<dyn GroupCursor>>;
}
