use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::query::bindings::{QueryBindings, QueryContext};
use crate::query::cursor::{BindingsCursor, Cursor, CursorState};
use crate::query::profile::LookupProfileKind;
use crate::storage::{Group, GroupCursor, HKey, HeldRow, Row};
use crate::types::{LookupError, Result};

use super::resolver::LookupPlan;

/// Where a [`SerialExecution`] stands with respect to the current input row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupState {
    /// Just opened, or done with the previous input row.
    Between,
    /// Ancestors of the current input row are buffered; no branch scan yet.
    Ancestor,
    /// Scanning the branch of the current input row.
    Branch,
    /// The input ran out.
    Exhausted,
}

/// Output buffer holding the rows produced for one input row.
#[derive(Debug)]
struct PendingRows {
    rows: VecDeque<Arc<Row>>,
    capacity: usize,
}

impl PendingRows {
    fn new(capacity: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn add(&mut self, row: Arc<Row>) {
        debug_assert!(self.rows.len() < self.capacity, "pending rows overflow");
        self.rows.push_back(row);
    }

    fn take(&mut self) -> Option<Arc<Row>> {
        self.rows.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn clear(&mut self) {
        self.rows.clear();
    }
}

/// Group lookup execution that resolves one input row at a time.
///
/// For each input row it performs one point lookup per ancestor and, when
/// descendants were requested, one subtree scan, all on a single group cursor.
pub struct SerialExecution {
    context: QueryContext,
    input: Box<dyn Cursor>,
    plan: Arc<LookupPlan>,
    lookup_cursor: Box<dyn GroupCursor>,
    input_row: HeldRow,
    pending: PendingRows,
    branch_hkey: HKey,
    lookup_state: LookupState,
    // Context handed out by the last `next_bindings`.
    current_bindings: Option<QueryBindings>,
    state: CursorState,
}

impl SerialExecution {
    /// Creates the execution over `input`.
    pub fn new(
        context: QueryContext,
        input: Box<dyn Cursor>,
        group: &Group,
        plan: Arc<LookupPlan>,
    ) -> Result<Self> {
        let lookup_cursor = context.adapter().new_group_cursor(group)?;
        // The input row itself may be buffered next to its ancestors.
        let pending = PendingRows::new(plan.ancestors().len() + 1);
        Ok(Self {
            context,
            input,
            plan,
            lookup_cursor,
            input_row: HeldRow::new(),
            pending,
            branch_hkey: HKey::new(),
            lookup_state: LookupState::Between,
            current_bindings: None,
            state: CursorState::Idle,
        })
    }

    /// Current state machine position.
    pub fn lookup_state(&self) -> LookupState {
        self.lookup_state
    }

    fn next_inner(&mut self) -> Result<Option<Arc<Row>>> {
        if self.context.config().lifecycle_checks {
            self.state.check_active()?;
        }
        self.context.check_cancel()?;
        while self.pending.is_empty() && self.lookup_state != LookupState::Exhausted {
            self.lookup_state = self.advance()?;
        }
        let row = self.pending.take();
        if let Some(row) = &row {
            trace!(row = %row, "group_lookup.yield");
            self.context.metrics().row_emitted();
        }
        Ok(row)
    }

    fn advance(&mut self) -> Result<LookupState> {
        match self.lookup_state {
            LookupState::Between => self.advance_input(),
            LookupState::Ancestor => self.advance_lookup(),
            LookupState::Branch => self.advance_branch(),
            LookupState::Exhausted => Ok(LookupState::Exhausted),
        }
    }

    fn advance_input(&mut self) -> Result<LookupState> {
        let Some(row) = self.input.next()? else {
            self.input_row.release();
            return Ok(LookupState::Exhausted);
        };
        let next = if row.row_type() == self.plan.input_row_type() {
            self.find_ancestors(&row)?;
            LookupState::Ancestor
        } else {
            LookupState::Between
        };
        if self.plan.keep_input() {
            self.pending.add(Arc::clone(&row));
        }
        self.input_row.hold(row);
        Ok(next)
    }

    fn find_ancestors(&mut self, row: &Row) -> Result<()> {
        debug_assert!(self.pending.is_empty());
        let plan = Arc::clone(&self.plan);
        for table in plan.ancestors() {
            let hkey = row.ancestor_hkey(table)?;
            if let Some(ancestor) = self.read_ancestor_row(&hkey)? {
                self.pending.add(ancestor);
            }
        }
        Ok(())
    }

    fn read_ancestor_row(&mut self, hkey: &HKey) -> Result<Option<Arc<Row>>> {
        self.lookup_cursor.rebind(hkey, false);
        let fetched = match self.lookup_cursor.open() {
            Ok(()) => self.lookup_cursor.next(),
            Err(err) => Err(err),
        };
        self.lookup_cursor.close();
        match fetched? {
            Some(row) if row.hkey() == hkey => Ok(Some(row)),
            // Intermediate rows may be absent; the lookup then lands on a
            // descendant or on nothing.
            _ => {
                self.context.metrics().ancestor_missing();
                Ok(None)
            }
        }
    }

    fn advance_lookup(&mut self) -> Result<LookupState> {
        let Some(branch) = self.plan.branch() else {
            self.input_row.release();
            return Ok(LookupState::Between);
        };
        let Some(input) = self.input_row.get() else {
            return Err(LookupError::Lifecycle("branch lookup without an input row"));
        };
        branch.anchor_into(input.hkey(), &mut self.branch_hkey);
        self.lookup_cursor.rebind(&self.branch_hkey, true);
        self.lookup_cursor.open()?;
        Ok(LookupState::Branch)
    }

    fn advance_branch(&mut self) -> Result<LookupState> {
        let Some(row) = self.lookup_cursor.next()? else {
            self.lookup_cursor.close();
            self.input_row.release();
            return Ok(LookupState::Between);
        };
        let wanted = self
            .plan
            .branch()
            .is_some_and(|branch| branch.wants(row.row_type()));
        if wanted {
            self.pending.add(row);
        } else {
            self.context.metrics().branch_row_skipped();
        }
        Ok(LookupState::Branch)
    }
}

impl Cursor for SerialExecution {
    fn open(&mut self) -> Result<()> {
        let timer = self.context.profile_timer();
        self.state.check_idle()?;
        self.input.open()?;
        self.lookup_state = LookupState::Between;
        self.state = CursorState::Active;
        debug!("group_lookup.serial.open");
        self.context
            .record_profile_timer(LookupProfileKind::Open, timer);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Arc<Row>>> {
        let timer = self.context.profile_timer();
        let result = self.next_inner();
        self.context
            .record_profile_timer(LookupProfileKind::Next, timer);
        result
    }

    fn close(&mut self) {
        if self.state != CursorState::Active {
            return;
        }
        self.input.close();
        self.lookup_cursor.close();
        self.input_row.release();
        self.pending.clear();
        self.lookup_state = LookupState::Between;
        self.state = CursorState::Idle;
        debug!("group_lookup.serial.close");
    }

    fn destroy(&mut self) {
        if self.state == CursorState::Destroyed {
            return;
        }
        self.close();
        self.input.destroy();
        self.lookup_cursor.destroy();
        self.state = CursorState::Destroyed;
    }

    fn state(&self) -> CursorState {
        self.state
    }
}

impl BindingsCursor for SerialExecution {
    fn open_bindings(&mut self) -> Result<()> {
        self.current_bindings = None;
        self.input.open_bindings()
    }

    fn next_bindings(&mut self) -> Result<Option<QueryBindings>> {
        self.current_bindings = self.input.next_bindings()?;
        Ok(self.current_bindings.clone())
    }

    fn close_bindings(&mut self) {
        self.current_bindings = None;
        self.input.close_bindings();
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) -> Result<()> {
        let in_flight = self
            .current_bindings
            .as_ref()
            .is_some_and(|current| current.descends_from(bindings));
        if in_flight {
            // Nothing more of this context may be yielded; `next` reports the
            // end until the cursor is reopened.
            self.lookup_cursor.close();
            self.input_row.release();
            self.pending.clear();
            self.lookup_state = LookupState::Exhausted;
            self.current_bindings = None;
        }
        self.input.cancel_bindings(bindings)?;
        debug!(bindings = %bindings, in_flight, "group_lookup.serial.cancel");
        Ok(())
    }
}
