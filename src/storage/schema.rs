use std::fmt;
use std::sync::Arc;

use crate::types::{LookupError, Ordinal, Result, TableId};

/// Metadata for one table of a group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    id: TableId,
    name: String,
    ordinal: Ordinal,
    depth: usize,
    parent: Option<TableId>,
}

impl Table {
    /// Arena identifier of the table.
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordinal used in hierarchical keys.
    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    /// Distance from the group root; the root table has depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Parent table, `None` for the root.
    pub fn parent(&self) -> Option<TableId> {
        self.parent
    }
}

/// A physical hierarchy of tables stored interleaved in hierarchical key order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    name: String,
    tables: Vec<Table>,
}

impl Group {
    /// Starts building a group whose root table is `root`.
    pub fn builder(name: impl Into<String>, root: impl Into<String>) -> GroupBuilder {
        GroupBuilder::new(name.into(), root.into())
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table with the given id.
    pub fn table(&self, id: TableId) -> Result<&Table> {
        self.tables
            .get(id.0 as usize)
            .ok_or_else(|| LookupError::Config(format!("table {id} is not in group {}", self.name)))
    }

    /// Looks up a table by name.
    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.tables.iter().find(|t| t.name == name).map(|t| t.id)
    }

    /// All tables in declaration order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Table name for display purposes; unknown ids render as `#<id>`.
    pub fn table_name(&self, id: TableId) -> String {
        self.tables
            .get(id.0 as usize)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("#{id}"))
    }

    /// Returns `true` when `ancestor` is a proper ancestor of `table`.
    pub fn is_ancestor(&self, ancestor: TableId, table: TableId) -> bool {
        let mut current = self.tables.get(table.0 as usize).and_then(|t| t.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.tables.get(id.0 as usize).and_then(|t| t.parent);
        }
        false
    }

    /// Returns the child of `ancestor` on the path down to `descendant`.
    ///
    /// `descendant` must be a proper descendant of `ancestor`.
    pub fn child_toward(&self, ancestor: TableId, descendant: TableId) -> Result<TableId> {
        let mut child = descendant;
        loop {
            let parent = self.table(child)?.parent.ok_or_else(|| {
                LookupError::Config(format!(
                    "{} is not a descendant of {}",
                    self.table_name(descendant),
                    self.table_name(ancestor)
                ))
            })?;
            if parent == ancestor {
                return Ok(child);
            }
            child = parent;
        }
    }
}

/// Incremental constructor for [`Group`]. Ordinals are assigned in
/// declaration order starting at 1.
#[derive(Debug)]
pub struct GroupBuilder {
    group: Group,
}

impl GroupBuilder {
    fn new(name: String, root: String) -> Self {
        let root = Table {
            id: TableId(0),
            name: root,
            ordinal: Ordinal(1),
            depth: 0,
            parent: None,
        };
        Self {
            group: Group {
                name,
                tables: vec![root],
            },
        }
    }

    /// Declares `name` as a child of the already declared table `parent`.
    pub fn child(mut self, name: impl Into<String>, parent: &str) -> Result<Self> {
        let name = name.into();
        if self.group.table_id(&name).is_some() {
            return Err(LookupError::Config(format!("duplicate table {name}")));
        }
        let parent_id = self
            .group
            .table_id(parent)
            .ok_or_else(|| LookupError::Config(format!("unknown parent table {parent}")))?;
        let depth = self.group.table(parent_id)?.depth + 1;
        let next = self.group.tables.len() as u32;
        self.group.tables.push(Table {
            id: TableId(next),
            name,
            ordinal: Ordinal(next + 1),
            depth,
            parent: Some(parent_id),
        });
        Ok(self)
    }

    /// Finishes the group.
    pub fn build(self) -> Arc<Group> {
        Arc::new(self.group)
    }
}

/// Shape of a row flowing through an operator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RowType {
    /// A full row of a group table.
    Table(TableId),
    /// An index entry that carries the hkey of its table row.
    Index {
        /// Indexed table.
        table: TableId,
        /// Index name.
        name: String,
    },
    /// A bare hierarchical key of a table row.
    HKey(TableId),
}

impl RowType {
    /// Table whose hierarchical key rows of this type carry.
    pub fn table(&self) -> TableId {
        match self {
            RowType::Table(table) | RowType::HKey(table) => *table,
            RowType::Index { table, .. } => *table,
        }
    }

    /// Returns `true` for full table rows.
    pub fn is_table(&self) -> bool {
        matches!(self, RowType::Table(_))
    }

    /// Renders the row type using the group's table names.
    pub fn display<'a>(&'a self, group: &'a Group) -> RowTypeDisplay<'a> {
        RowTypeDisplay { row_type: self, group }
    }
}

/// [`fmt::Display`] adapter returned by [`RowType::display`].
pub struct RowTypeDisplay<'a> {
    row_type: &'a RowType,
    group: &'a Group,
}

impl fmt::Display for RowTypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row_type {
            RowType::Table(table) => f.write_str(&self.group.table_name(*table)),
            RowType::Index { table, name } => {
                write!(f, "{}.{name}", self.group.table_name(*table))
            }
            RowType::HKey(table) => write!(f, "HKey({})", self.group.table_name(*table)),
        }
    }
}
