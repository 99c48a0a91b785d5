use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::types::{LookupError, Result};

use super::cursor::{GroupCursor, StoreAdapter};
use super::hkey::HKey;
use super::metrics::{default_metrics, StorageMetrics};
use super::row::Row;
use super::schema::Group;

type GroupRows = BTreeMap<HKey, Arc<Row>>;

#[derive(Default)]
struct StoreState {
    groups: HashMap<String, GroupRows>,
    failing: HashSet<HKey>,
}

struct StoreInner {
    state: RwLock<StoreState>,
    metrics: Arc<dyn StorageMetrics>,
}

/// Group store keeping every group's rows in an ordered map.
///
/// Clones share the same rows.
#[derive(Clone)]
pub struct MemoryGroupStore {
    inner: Arc<StoreInner>,
}

impl Default for MemoryGroupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGroupStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_metrics(default_metrics())
    }

    /// Creates an empty store reporting cursor activity to `metrics`.
    pub fn with_metrics(metrics: Arc<dyn StorageMetrics>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState::default()),
                metrics,
            }),
        }
    }

    /// Inserts or replaces a row of `group`.
    pub fn insert(&self, group: &Group, row: Row) {
        let mut state = self.inner.state.write();
        let rows = state.groups.entry(group.name().to_owned()).or_default();
        rows.insert(row.hkey().clone(), Arc::new(row));
    }

    /// Removes the row stored under `hkey`, returning it.
    pub fn delete(&self, group: &Group, hkey: &HKey) -> Option<Arc<Row>> {
        let mut state = self.inner.state.write();
        state.groups.get_mut(group.name())?.remove(hkey)
    }

    /// Number of rows stored for `group`.
    pub fn len(&self, group: &Group) -> usize {
        let state = self.inner.state.read();
        state.groups.get(group.name()).map_or(0, BTreeMap::len)
    }

    /// Returns `true` when `group` has no rows.
    pub fn is_empty(&self, group: &Group) -> bool {
        self.len(group) == 0
    }

    /// Makes every cursor opened at exactly `hkey` fail with a storage error.
    pub fn fail_on(&self, hkey: HKey) {
        self.inner.state.write().failing.insert(hkey);
    }
}

impl StoreAdapter for MemoryGroupStore {
    fn new_group_cursor(&self, group: &Group) -> Result<Box<dyn GroupCursor>> {
        Ok(Box::new(MemoryGroupCursor {
            inner: Arc::clone(&self.inner),
            group: group.name().to_owned(),
            target: HKey::new(),
            deep: false,
            position: None,
            destroyed: false,
        }))
    }
}

struct Position {
    last: Option<HKey>,
    done: bool,
}

/// Cursor over a [`MemoryGroupStore`].
///
/// The cursor remembers the last key it returned and re-seeks on every call,
/// so concurrent inserts and deletes never invalidate it.
pub struct MemoryGroupCursor {
    inner: Arc<StoreInner>,
    group: String,
    target: HKey,
    deep: bool,
    position: Option<Position>,
    destroyed: bool,
}

impl GroupCursor for MemoryGroupCursor {
    fn rebind(&mut self, hkey: &HKey, deep: bool) {
        hkey.copy_to(&mut self.target);
        self.deep = deep;
    }

    fn open(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(LookupError::Lifecycle("group cursor destroyed"));
        }
        if self.position.is_some() {
            return Err(LookupError::Lifecycle("group cursor already open"));
        }
        if self.inner.state.read().failing.contains(&self.target) {
            return Err(LookupError::Storage(format!(
                "injected failure opening {}",
                self.target
            )));
        }
        trace!(hkey = %self.target, deep = self.deep, "memory_store.cursor.open");
        self.position = Some(Position {
            last: None,
            done: false,
        });
        self.inner.metrics.cursor_opened(self.deep);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Arc<Row>>> {
        let Some(position) = self.position.as_mut() else {
            return Err(LookupError::Lifecycle("group cursor not open"));
        };
        if position.done {
            return Ok(None);
        }
        let state = self.inner.state.read();
        let found = state.groups.get(&self.group).and_then(|rows| {
            let lower = match &position.last {
                Some(last) => Bound::Excluded(last),
                None => Bound::Included(&self.target),
            };
            rows.range::<HKey, _>((lower, Bound::Unbounded)).next()
        });
        let row = match found {
            Some((key, row)) if self.target.is_prefix_of(key) => Arc::clone(row),
            _ => {
                position.done = true;
                return Ok(None);
            }
        };
        if self.deep {
            position.last = Some(row.hkey().clone());
        } else {
            position.done = true;
        }
        self.inner.metrics.row_fetched();
        Ok(Some(row))
    }

    fn close(&mut self) {
        if self.position.take().is_some() {
            self.inner.metrics.cursor_closed();
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.close();
        self.destroyed = true;
        self.inner.metrics.cursor_destroyed();
    }

    fn is_open(&self) -> bool {
        self.position.is_some()
    }
}
