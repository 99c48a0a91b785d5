use std::fmt;
use std::sync::Arc;

use crate::types::{LookupError, Result};

use super::hkey::{HKey, Value};
use super::schema::{RowType, Table};

/// A row of a group table, an index entry or a bare hkey.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    row_type: RowType,
    hkey: HKey,
    fields: Vec<Value>,
}

impl Row {
    /// Creates a row.
    pub fn new(row_type: RowType, hkey: HKey, fields: Vec<Value>) -> Self {
        Self {
            row_type,
            hkey,
            fields,
        }
    }

    /// Wraps the row in the shared handle cursors pass around.
    pub fn into_shared(self) -> Arc<Row> {
        Arc::new(self)
    }

    /// Row type.
    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    /// Hierarchical key of the row (for index rows, the key of the indexed row).
    pub fn hkey(&self) -> &HKey {
        &self.hkey
    }

    /// Column values.
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Computes the hierarchical key of the row's ancestor in `table`.
    ///
    /// `table` may be the row's own table, in which case the full key is
    /// returned.
    pub fn ancestor_hkey(&self, table: &Table) -> Result<HKey> {
        match self.hkey.segments().get(table.depth()) {
            Some(segment) if segment.ordinal() == table.ordinal() => {
                Ok(self.hkey.ancestor(table.depth()))
            }
            _ => Err(LookupError::NotAncestor(table.name().to_owned())),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.hkey)?;
        for (idx, value) in self.fields.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

/// Holder for at most one shared row.
///
/// Holding a new row releases the previous one; every hold is released
/// exactly once, either explicitly, by being replaced, or on drop.
#[derive(Debug, Default)]
pub struct HeldRow {
    row: Option<Arc<Row>>,
}

impl HeldRow {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds `row`, releasing whatever was held before.
    pub fn hold(&mut self, row: Arc<Row>) {
        self.row = Some(row);
    }

    /// Returns `true` while a row is held.
    pub fn is_holding(&self) -> bool {
        self.row.is_some()
    }

    /// Borrows the held row.
    pub fn get(&self) -> Option<&Arc<Row>> {
        self.row.as_ref()
    }

    /// Releases the held row, if any.
    pub fn release(&mut self) {
        self.row = None;
    }

    /// Moves the held row out, leaving the holder empty.
    pub fn take(&mut self) -> Option<Arc<Row>> {
        self.row.take()
    }
}
