use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::query::bindings::{QueryBindings, QueryContext};
use crate::query::cursor::{BindingsCursor, Cursor, CursorState};
use crate::query::profile::LookupProfileKind;
use crate::storage::{Group, GroupCursor, HKey, HeldRow, Row, Table};
use crate::types::{LookupError, Result};

use super::resolver::LookupPlan;

#[derive(Clone, Debug)]
enum LaneKind {
    Ancestor(Table),
    KeepInput,
    Branch,
}

/// One output position of a slot: a sub-cursor for an ancestor or the branch,
/// or the input row itself.
struct Lane {
    kind: LaneKind,
    cursor: Option<Box<dyn GroupCursor>>,
    hkey: HKey,
}

impl Lane {
    fn is_open(&self) -> bool {
        self.cursor.as_ref().is_some_and(|cursor| cursor.is_open())
    }

    fn close(&mut self) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.close();
        }
    }

    fn destroy(&mut self) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.destroy();
        }
    }
}

/// Ring buffer entry: one input row, the context it arrived in, and its lanes.
struct Slot {
    input_row: HeldRow,
    bindings: Option<QueryBindings>,
    lanes: Vec<Lane>,
}

impl Slot {
    fn is_holding(&self) -> bool {
        self.input_row.is_holding()
    }

    fn reset(&mut self) {
        self.input_row.release();
        self.bindings = None;
        for lane in &mut self.lanes {
            lane.close();
        }
    }

    fn fill(&mut self, plan: &LookupPlan, row: Arc<Row>, bindings: QueryBindings) -> Result<()> {
        let expands = row.row_type() == plan.input_row_type();
        self.bindings = Some(bindings);
        self.input_row.hold(Arc::clone(&row));
        if !expands {
            return Ok(());
        }
        for lane in &mut self.lanes {
            let deep = match &lane.kind {
                LaneKind::KeepInput => continue,
                LaneKind::Ancestor(table) => {
                    lane.hkey = row.ancestor_hkey(table)?;
                    false
                }
                LaneKind::Branch => {
                    let Some(branch) = plan.branch() else {
                        continue;
                    };
                    branch.anchor_into(row.hkey(), &mut lane.hkey);
                    true
                }
            };
            if let Some(cursor) = lane.cursor.as_mut() {
                cursor.rebind(&lane.hkey, deep);
                cursor.open()?;
            }
        }
        Ok(())
    }
}

/// Group lookup execution that keeps lookups open for input rows further
/// down the input, including rows of contexts the consumer has not reached.
///
/// The ring holds `ceil(quantum / cursors_per_row)` slots. The fill phase
/// pulls input rows (and, once a context runs dry, further contexts) until
/// the ring is full; the drain phase emits slots in arrival order and stops
/// at the first slot that belongs to a different context.
pub struct LookaheadExecution {
    context: QueryContext,
    input: Box<dyn Cursor>,
    plan: Arc<LookupPlan>,
    slots: Vec<Slot>,
    current_index: usize,
    next_index: usize,
    lane_index: usize,
    // Context the consumer is iterating.
    current_bindings: Option<QueryBindings>,
    // Context the input is open for while filling.
    next_bindings: Option<QueryBindings>,
    // Contexts pulled ahead by the fill phase, not yet handed out.
    pending_bindings: VecDeque<QueryBindings>,
    new_bindings: bool,
    bindings_exhausted: bool,
    drained: bool,
    state: CursorState,
}

impl LookaheadExecution {
    /// Creates the execution over `input` with room for about `quantum`
    /// open sub-cursors.
    pub fn new(
        context: QueryContext,
        input: Box<dyn Cursor>,
        group: &Group,
        plan: Arc<LookupPlan>,
        quantum: usize,
    ) -> Result<Self> {
        let per_row = plan.cursors_per_row().max(1);
        let capacity = quantum.div_ceil(per_row).max(1);
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                input_row: HeldRow::new(),
                bindings: None,
                lanes: Self::lanes(&context, group, &plan)?,
            });
        }
        debug!(
            quantum,
            slots = capacity,
            cursors_per_row = per_row,
            "group_lookup.lookahead.new"
        );
        Ok(Self {
            context,
            input,
            plan,
            slots,
            current_index: 0,
            next_index: 0,
            lane_index: 0,
            current_bindings: None,
            next_bindings: None,
            pending_bindings: VecDeque::new(),
            new_bindings: false,
            bindings_exhausted: false,
            drained: false,
            state: CursorState::Idle,
        })
    }

    fn lanes(context: &QueryContext, group: &Group, plan: &LookupPlan) -> Result<Vec<Lane>> {
        let adapter = context.adapter();
        let mut lanes = Vec::with_capacity(plan.cursors_per_row() + 1);
        for table in plan.ancestors() {
            lanes.push(Lane {
                kind: LaneKind::Ancestor(table.clone()),
                cursor: Some(adapter.new_group_cursor(group)?),
                hkey: HKey::new(),
            });
        }
        if plan.keep_input() {
            lanes.push(Lane {
                kind: LaneKind::KeepInput,
                cursor: None,
                hkey: HKey::new(),
            });
        }
        if plan.branch().is_some() {
            lanes.push(Lane {
                kind: LaneKind::Branch,
                cursor: Some(adapter.new_group_cursor(group)?),
                hkey: HKey::new(),
            });
        }
        Ok(lanes)
    }

    /// Number of ring slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently holding an input row.
    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_holding()).count()
    }

    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    fn fill(&mut self) -> Result<()> {
        while !self.bindings_exhausted && !self.slots[self.next_index].is_holding() {
            if self.next_bindings.is_none() {
                if self.new_bindings {
                    self.next_bindings = self.current_bindings.clone();
                    self.new_bindings = false;
                }
                if self.next_bindings.is_none() {
                    match self.input.next_bindings()? {
                        Some(bindings) => {
                            trace!(bindings = %bindings, "group_lookup.lookahead.prefetch");
                            self.pending_bindings.push_back(bindings.clone());
                            self.next_bindings = Some(bindings);
                        }
                        None => {
                            self.bindings_exhausted = true;
                            break;
                        }
                    }
                }
                if let Err(err) = self.input.open() {
                    self.next_bindings = None;
                    return Err(err);
                }
            }
            let Some(row) = self.input.next()? else {
                self.input.close();
                self.next_bindings = None;
                continue;
            };
            let Some(bindings) = self.next_bindings.clone() else {
                return Err(LookupError::Lifecycle("input row without a context"));
            };
            let slot = &mut self.slots[self.next_index];
            if let Err(err) = slot.fill(&self.plan, row, bindings) {
                slot.reset();
                return Err(err);
            }
            self.next_index = self.advance(self.next_index);
        }
        Ok(())
    }

    fn next_inner(&mut self) -> Result<Option<Arc<Row>>> {
        if self.context.config().lifecycle_checks {
            self.state.check_active()?;
        }
        self.context.check_cancel()?;
        let row = self.drain()?;
        if let Some(row) = &row {
            trace!(row = %row, "group_lookup.yield");
            self.context.metrics().row_emitted();
        }
        Ok(row)
    }

    fn drain(&mut self) -> Result<Option<Arc<Row>>> {
        if self.drained {
            return Ok(None);
        }
        self.fill()?;
        loop {
            let index = self.current_index;
            let slot = &mut self.slots[index];
            if !slot.is_holding() || slot.bindings != self.current_bindings {
                self.drained = true;
                return Ok(None);
            }
            let Some(lane) = slot.lanes.get_mut(self.lane_index) else {
                slot.reset();
                self.current_index = self.advance(index);
                self.lane_index = 0;
                self.fill()?;
                continue;
            };
            match lane.kind {
                LaneKind::KeepInput => {
                    self.lane_index += 1;
                    if let Some(row) = slot.input_row.get() {
                        return Ok(Some(Arc::clone(row)));
                    }
                }
                // Lanes of rows that were only passed through were never opened.
                _ if !lane.is_open() => self.lane_index += 1,
                LaneKind::Ancestor(_) => {
                    let fetched = match lane.cursor.as_mut() {
                        Some(cursor) => cursor.next(),
                        None => Ok(None),
                    };
                    lane.close();
                    self.lane_index += 1;
                    match fetched? {
                        Some(row) if row.hkey() == &lane.hkey => return Ok(Some(row)),
                        _ => self.context.metrics().ancestor_missing(),
                    }
                }
                LaneKind::Branch => {
                    let fetched = match lane.cursor.as_mut() {
                        Some(cursor) => cursor.next()?,
                        None => None,
                    };
                    match fetched {
                        None => {
                            lane.close();
                            self.lane_index += 1;
                        }
                        Some(row) => {
                            let wanted = self
                                .plan
                                .branch()
                                .is_some_and(|branch| branch.wants(row.row_type()));
                            if wanted {
                                return Ok(Some(row));
                            }
                            self.context.metrics().branch_row_skipped();
                        }
                    }
                }
            }
        }
    }

    /// Frees every buffered slot whose context matches `cancelled`, keeping
    /// the survivors contiguous and in arrival order. Returns the number of
    /// slots freed.
    fn discard_slots(&mut self, cancelled: impl Fn(&QueryBindings) -> bool) -> usize {
        let len = self.slots.len();
        let is_cancelled = |slot: &Slot| {
            slot.is_holding() && slot.bindings.as_ref().is_some_and(&cancelled)
        };
        if is_cancelled(&self.slots[self.current_index]) {
            self.lane_index = 0;
        }
        self.slots.rotate_left(self.current_index);
        let mut kept = Vec::with_capacity(len);
        let mut free = Vec::new();
        let mut discarded = 0;
        for mut slot in self.slots.drain(..) {
            if is_cancelled(&slot) {
                slot.reset();
                discarded += 1;
                free.push(slot);
            } else if slot.is_holding() {
                kept.push(slot);
            } else {
                free.push(slot);
            }
        }
        let buffered = kept.len();
        kept.extend(free);
        self.slots = kept;
        self.current_index = 0;
        self.next_index = buffered % len;
        discarded
    }

    /// Drops what is left of the consumer's current context: its buffered
    /// slots and, if the input is still open for it, the input.
    fn leave_current(&mut self) {
        let Some(current) = self.current_bindings.clone() else {
            return;
        };
        self.discard_slots(|bindings| *bindings == current);
        if self.next_bindings.as_ref() == Some(&current) {
            self.input.close();
            self.next_bindings = None;
        }
        self.new_bindings = false;
    }

    fn clear_bindings(&mut self) {
        if self.next_bindings.take().is_some() {
            self.input.close();
        }
        for slot in &mut self.slots {
            slot.reset();
        }
        self.pending_bindings.clear();
        self.current_bindings = None;
        self.new_bindings = false;
        self.current_index = 0;
        self.next_index = 0;
        self.lane_index = 0;
        self.drained = false;
    }
}

impl Cursor for LookaheadExecution {
    fn open(&mut self) -> Result<()> {
        let timer = self.context.profile_timer();
        self.state.check_idle()?;
        if self.current_bindings.is_none() {
            return Err(LookupError::Lifecycle("open called without current bindings"));
        }
        self.lane_index = 0;
        self.drained = false;
        self.state = CursorState::Active;
        debug!(slots = self.slots.len(), "group_lookup.lookahead.open");
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
        self.leave_current();
        self.lane_index = 0;
        self.drained = false;
        self.state = CursorState::Idle;
        debug!("group_lookup.lookahead.close");
    }

    fn destroy(&mut self) {
        if self.state == CursorState::Destroyed {
            return;
        }
        self.close();
        self.clear_bindings();
        for slot in &mut self.slots {
            for lane in &mut slot.lanes {
                lane.destroy();
            }
        }
        self.input.destroy();
        self.state = CursorState::Destroyed;
    }

    fn state(&self) -> CursorState {
        self.state
    }
}

impl BindingsCursor for LookaheadExecution {
    fn open_bindings(&mut self) -> Result<()> {
        self.clear_bindings();
        self.input.open_bindings()?;
        self.bindings_exhausted = false;
        Ok(())
    }

    fn next_bindings(&mut self) -> Result<Option<QueryBindings>> {
        if self.context.config().lifecycle_checks {
            self.state.check_idle()?;
        }
        self.leave_current();
        let (bindings, fresh) = match self.pending_bindings.pop_front() {
            // Already pulled ahead; the fill phase is reading or has read it.
            Some(bindings) => (Some(bindings), false),
            None if self.bindings_exhausted => (None, false),
            None => {
                let bindings = self.input.next_bindings()?;
                if bindings.is_none() {
                    self.bindings_exhausted = true;
                }
                let fresh = bindings.is_some();
                (bindings, fresh)
            }
        };
        self.new_bindings = fresh;
        self.current_bindings = bindings.clone();
        Ok(bindings)
    }

    fn close_bindings(&mut self) {
        self.close();
        self.input.close_bindings();
        self.clear_bindings();
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) -> Result<()> {
        let before = self.pending_bindings.len();
        self.pending_bindings
            .retain(|pending| !pending.descends_from(bindings));
        let dropped_contexts = before - self.pending_bindings.len();
        let discarded = self.discard_slots(|slot_bindings| slot_bindings.descends_from(bindings));

        if self
            .current_bindings
            .as_ref()
            .is_some_and(|current| current.descends_from(bindings))
        {
            self.current_bindings = None;
            self.new_bindings = false;
            self.drained = true;
        }
        self.input.cancel_bindings(bindings)?;
        if self
            .next_bindings
            .as_ref()
            .is_some_and(|filling| filling.descends_from(bindings))
        {
            self.input.close();
            self.next_bindings = None;
        }
        debug!(
            bindings = %bindings,
            contexts = dropped_contexts,
            slots = discarded,
            "group_lookup.lookahead.cancel"
        );
        self.context.metrics().bindings_cancelled(discarded);
        Ok(())
    }
}
