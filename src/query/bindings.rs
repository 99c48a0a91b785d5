use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::LookupConfig;
use crate::storage::{StoreAdapter, Value};
use crate::types::{BindingsId, LookupError, Result};

use super::profile::{LookupMetrics, LookupProfileKind, NoopLookupMetrics};

struct BindingsInner {
    id: BindingsId,
    parent: Option<QueryBindings>,
    values: Vec<Value>,
}

/// Parameter context of one outer-loop iteration.
///
/// Contexts compare by identity: two handles are equal only when they were
/// cloned from the same context. Nested loops create child contexts whose
/// parent is the enclosing iteration.
#[derive(Clone)]
pub struct QueryBindings {
    inner: Arc<BindingsInner>,
}

impl QueryBindings {
    /// Creates a top-level context.
    pub fn root(id: u64) -> Self {
        Self::build(id, None, Vec::new())
    }

    /// Creates a context nested inside `self`.
    pub fn child(&self, id: u64) -> Self {
        Self::build(id, Some(self.clone()), Vec::new())
    }

    /// Creates a top-level context binding `values`.
    pub fn root_with_values(id: u64, values: Vec<Value>) -> Self {
        Self::build(id, None, values)
    }

    /// Creates a context nested inside `self` binding `values`.
    pub fn child_with_values(&self, id: u64, values: Vec<Value>) -> Self {
        Self::build(id, Some(self.clone()), values)
    }

    fn build(id: u64, parent: Option<QueryBindings>, values: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(BindingsInner {
                id: BindingsId(id),
                parent,
                values,
            }),
        }
    }

    /// Caller-assigned identifier, used for logging.
    pub fn id(&self) -> BindingsId {
        self.inner.id
    }

    /// Enclosing context.
    pub fn parent(&self) -> Option<&QueryBindings> {
        self.inner.parent.as_ref()
    }

    /// Parameter values bound in this context.
    pub fn values(&self) -> &[Value] {
        &self.inner.values
    }

    /// Parameter `index`, searching enclosing contexts when this one has
    /// fewer values.
    pub fn value(&self, index: usize) -> Option<&Value> {
        let mut current = Some(self);
        while let Some(bindings) = current {
            if let Some(value) = bindings.inner.values.get(index) {
                return Some(value);
            }
            current = bindings.parent();
        }
        None
    }

    /// Nesting depth; top-level contexts have depth 0.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(parent) = current {
            depth += 1;
            current = parent.parent();
        }
        depth
    }

    /// Returns `true` when `self` is `ancestor` or nested (at any depth) inside it.
    pub fn descends_from(&self, ancestor: &QueryBindings) -> bool {
        let mut current = Some(self);
        while let Some(bindings) = current {
            if bindings == ancestor {
                return true;
            }
            current = bindings.parent();
        }
        false
    }
}

impl PartialEq for QueryBindings {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for QueryBindings {}

impl fmt::Debug for QueryBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBindings")
            .field("id", &self.inner.id.0)
            .field("depth", &self.depth())
            .finish()
    }
}

impl fmt::Display for QueryBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent() {
            Some(parent) => write!(f, "{parent}/{}", self.inner.id),
            None => write!(f, "{}", self.inner.id),
        }
    }
}

/// Everything a cursor needs from the query it runs in: the store, settings,
/// cancel token and metrics sink.
#[derive(Clone)]
pub struct QueryContext {
    adapter: Arc<dyn StoreAdapter>,
    config: LookupConfig,
    cancel: Option<Arc<AtomicBool>>,
    metrics: Arc<dyn LookupMetrics>,
}

impl QueryContext {
    /// Creates a context over `adapter` with default settings.
    pub fn new(adapter: Arc<dyn StoreAdapter>) -> Self {
        Self {
            adapter,
            config: LookupConfig::default(),
            cancel: None,
            metrics: Arc::new(NoopLookupMetrics),
        }
    }

    /// Replaces the settings.
    pub fn with_config(mut self, config: LookupConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a cancel token; setting it to `true` cancels the query.
    pub fn with_cancel_token(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Replaces the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn LookupMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Store adapter used to create group cursors.
    pub fn adapter(&self) -> &Arc<dyn StoreAdapter> {
        &self.adapter
    }

    /// Settings.
    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Metrics sink.
    pub fn metrics(&self) -> &dyn LookupMetrics {
        &*self.metrics
    }

    /// Fails with [`LookupError::Cancelled`] once the cancel token is set.
    pub fn check_cancel(&self) -> Result<()> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::SeqCst) {
                return Err(LookupError::Cancelled);
            }
        }
        Ok(())
    }

    pub(crate) fn profile_timer(&self) -> Option<Instant> {
        self.config.profile.then(Instant::now)
    }

    pub(crate) fn record_profile_timer(&self, kind: LookupProfileKind, start: Option<Instant>) {
        let Some(start) = start else {
            return;
        };
        let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        self.metrics.timing(kind, nanos);
    }
}
