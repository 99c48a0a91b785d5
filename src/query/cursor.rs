use std::sync::Arc;

use crate::storage::Row;
use crate::types::{LookupError, Result};

use super::bindings::{QueryBindings, QueryContext};

/// Lifecycle position of a cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    /// Created or closed; may be opened.
    Idle,
    /// Opened; may be iterated and closed.
    Active,
    /// Torn down; every further call is a violation.
    Destroyed,
}

impl CursorState {
    pub(crate) fn check_idle(self) -> Result<()> {
        match self {
            CursorState::Idle => Ok(()),
            CursorState::Active => Err(LookupError::Lifecycle("cursor is already open")),
            CursorState::Destroyed => Err(LookupError::Lifecycle("cursor is destroyed")),
        }
    }

    pub(crate) fn check_active(self) -> Result<()> {
        match self {
            CursorState::Active => Ok(()),
            CursorState::Idle => Err(LookupError::Lifecycle("cursor is not open")),
            CursorState::Destroyed => Err(LookupError::Lifecycle("cursor is destroyed")),
        }
    }
}

/// Source of parameter contexts for nested-loop evaluation.
pub trait BindingsCursor {
    /// Starts (or restarts) delivering contexts.
    fn open_bindings(&mut self) -> Result<()>;

    /// Returns the next context, or `None` once all were delivered.
    fn next_bindings(&mut self) -> Result<Option<QueryBindings>>;

    /// Stops delivering contexts and drops any read-ahead state.
    fn close_bindings(&mut self);

    /// Abandons `bindings` and every context nested inside it.
    fn cancel_bindings(&mut self, bindings: &QueryBindings) -> Result<()>;
}

/// Pull cursor over the rows an operator produces for the current context.
///
/// The lifecycle is `Idle -> open -> Active -> close -> Idle`, ending with
/// `destroy`. Calling `next` on an idle cursor or `open` on an active one is a
/// [`LookupError::Lifecycle`] violation.
pub trait Cursor: BindingsCursor {
    /// Starts producing rows for the current context.
    fn open(&mut self) -> Result<()>;

    /// Returns the next row, or `None` when the current context is finished.
    fn next(&mut self) -> Result<Option<Arc<Row>>>;

    /// Stops producing rows for the current context. Idempotent.
    fn close(&mut self);

    /// Releases every resource. Idempotent and allowed in any state.
    fn destroy(&mut self);

    /// Current lifecycle position.
    fn state(&self) -> CursorState;

    /// Returns `true` while idle.
    fn is_idle(&self) -> bool {
        self.state() == CursorState::Idle
    }

    /// Returns `true` while active.
    fn is_active(&self) -> bool {
        self.state() == CursorState::Active
    }

    /// Returns `true` once destroyed.
    fn is_destroyed(&self) -> bool {
        self.state() == CursorState::Destroyed
    }
}

/// A node of an executable plan.
pub trait Operator: Send + Sync {
    /// Creates a cursor that takes its contexts from `bindings`.
    fn cursor(
        &self,
        context: &QueryContext,
        bindings: Box<dyn BindingsCursor>,
    ) -> Result<Box<dyn Cursor>>;

    /// Renders this operator and its inputs, innermost first.
    fn describe_plan(&self) -> String;
}

/// Bindings provider backed by a fixed list of contexts.
///
/// Cancelling a context skips every not yet delivered context nested inside it.
#[derive(Debug, Clone, Default)]
pub struct BindingsList {
    contexts: Vec<QueryBindings>,
    position: usize,
    cancelled: Vec<QueryBindings>,
}

impl BindingsList {
    /// Creates a provider delivering `contexts` in order.
    pub fn new(contexts: Vec<QueryBindings>) -> Self {
        Self {
            contexts,
            position: 0,
            cancelled: Vec::new(),
        }
    }

    /// Provider delivering a single top-level context.
    pub fn single() -> Self {
        Self::new(vec![QueryBindings::root(0)])
    }
}

impl BindingsCursor for BindingsList {
    fn open_bindings(&mut self) -> Result<()> {
        self.position = 0;
        self.cancelled.clear();
        Ok(())
    }

    fn next_bindings(&mut self) -> Result<Option<QueryBindings>> {
        while let Some(bindings) = self.contexts.get(self.position) {
            self.position += 1;
            if self.cancelled.iter().any(|c| bindings.descends_from(c)) {
                continue;
            }
            return Ok(Some(bindings.clone()));
        }
        Ok(None)
    }

    fn close_bindings(&mut self) {
        self.position = self.contexts.len();
        self.cancelled.clear();
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) -> Result<()> {
        self.cancelled.push(bindings.clone());
        Ok(())
    }
}

/// Runs `cursor` through the full bindings protocol and collects every row.
pub fn drain_cursor(cursor: &mut dyn Cursor) -> Result<Vec<Arc<Row>>> {
    let mut rows = Vec::new();
    cursor.open_bindings()?;
    while cursor.next_bindings()?.is_some() {
        cursor.open()?;
        let result = collect_open(cursor, &mut rows);
        cursor.close();
        result?;
    }
    cursor.close_bindings();
    Ok(rows)
}

fn collect_open(cursor: &mut dyn Cursor, rows: &mut Vec<Arc<Row>>) -> Result<()> {
    while let Some(row) = cursor.next()? {
        rows.push(row);
    }
    Ok(())
}
