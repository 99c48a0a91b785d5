use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::storage::Row;
use crate::types::{LookupError, Result};

use super::bindings::{QueryBindings, QueryContext};
use super::cursor::{BindingsCursor, Cursor, CursorState, Operator};

type RowSource = dyn Fn(&QueryBindings) -> Result<Vec<Arc<Row>>> + Send + Sync;

/// Leaf operator producing rows computed from the current context.
#[derive(Clone)]
pub struct ValuesScan {
    source: Arc<RowSource>,
}

impl ValuesScan {
    /// Produces the rows `source` returns for each context.
    pub fn new<F>(source: F) -> Self
    where
        F: Fn(&QueryBindings) -> Result<Vec<Arc<Row>>> + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(source),
        }
    }

    /// Produces the same rows for every context.
    pub fn fixed(rows: Vec<Arc<Row>>) -> Self {
        Self::new(move |_| Ok(rows.clone()))
    }
}

impl Operator for ValuesScan {
    fn cursor(
        &self,
        _context: &QueryContext,
        bindings: Box<dyn BindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(ValuesCursor {
            source: Arc::clone(&self.source),
            bindings,
            current: None,
            rows: VecDeque::new(),
            state: CursorState::Idle,
        }))
    }

    fn describe_plan(&self) -> String {
        "ValuesScan".to_owned()
    }
}

struct ValuesCursor {
    source: Arc<RowSource>,
    bindings: Box<dyn BindingsCursor>,
    current: Option<QueryBindings>,
    rows: VecDeque<Arc<Row>>,
    state: CursorState,
}

impl Cursor for ValuesCursor {
    fn open(&mut self) -> Result<()> {
        self.state.check_idle()?;
        let Some(current) = self.current.as_ref() else {
            return Err(LookupError::Lifecycle("open called without current bindings"));
        };
        self.rows = (self.source)(current)?.into();
        trace!(bindings = %current, rows = self.rows.len(), "values_scan.open");
        self.state = CursorState::Active;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Arc<Row>>> {
        self.state.check_active()?;
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) {
        if self.state == CursorState::Active {
            self.rows.clear();
            self.state = CursorState::Idle;
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.current = None;
        self.state = CursorState::Destroyed;
    }

    fn state(&self) -> CursorState {
        self.state
    }
}

impl BindingsCursor for ValuesCursor {
    fn open_bindings(&mut self) -> Result<()> {
        self.current = None;
        self.bindings.open_bindings()
    }

    fn next_bindings(&mut self) -> Result<Option<QueryBindings>> {
        self.current = self.bindings.next_bindings()?;
        Ok(self.current.clone())
    }

    fn close_bindings(&mut self) {
        self.close();
        self.current = None;
        self.bindings.close_bindings();
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) -> Result<()> {
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.descends_from(bindings))
        {
            self.close();
            self.current = None;
        }
        self.bindings.cancel_bindings(bindings)
    }
}
