use std::sync::atomic::{AtomicU64, Ordering};

/// Phase being timed when profiling is enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupProfileKind {
    /// Cursor `open` calls.
    Open,
    /// Cursor `next` calls.
    Next,
}

/// Sink for group lookup events.
///
/// Supplied through the query context so that every execution reports to
/// the sink its caller chose.
pub trait LookupMetrics: Send + Sync {
    /// Records the duration of one timed call.
    fn timing(&self, kind: LookupProfileKind, nanos: u64);

    /// Records one row handed to the consumer.
    fn row_emitted(&self);

    /// Records an ancestor lookup that found no exact match.
    fn ancestor_missing(&self);

    /// Records a branch scan row dropped because its type was not requested.
    fn branch_row_skipped(&self);

    /// Records a context cancellation and the number of buffered rows it discarded.
    fn bindings_cancelled(&self, discarded: usize);
}

/// A [`LookupMetrics`] sink that discards everything.
#[derive(Default)]
pub struct NoopLookupMetrics;

impl LookupMetrics for NoopLookupMetrics {
    fn timing(&self, _kind: LookupProfileKind, _nanos: u64) {}
    fn row_emitted(&self) {}
    fn ancestor_missing(&self) {}
    fn branch_row_skipped(&self) {}
    fn bindings_cancelled(&self, _discarded: usize) {}
}

/// A snapshot of lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupProfileSnapshot {
    /// Total nanoseconds spent in `open`.
    pub open_ns: u64,
    /// Number of timed `open` calls.
    pub open_count: u64,
    /// Total nanoseconds spent in `next`.
    pub next_ns: u64,
    /// Number of timed `next` calls.
    pub next_count: u64,
    /// Rows handed to consumers.
    pub rows_emitted: u64,
    /// Ancestor lookups without an exact match.
    pub ancestors_missing: u64,
    /// Branch rows skipped for being of an unrequested type.
    pub branch_rows_skipped: u64,
    /// Context cancellations.
    pub cancellations: u64,
    /// Buffered input rows discarded by cancellations.
    pub cancelled_rows: u64,
}

/// Atomic-counter implementation of [`LookupMetrics`].
#[derive(Default)]
pub struct CounterLookupMetrics {
    open_ns: AtomicU64,
    open_count: AtomicU64,
    next_ns: AtomicU64,
    next_count: AtomicU64,
    rows_emitted: AtomicU64,
    ancestors_missing: AtomicU64,
    branch_rows_skipped: AtomicU64,
    cancellations: AtomicU64,
    cancelled_rows: AtomicU64,
}

impl CounterLookupMetrics {
    /// Reads all counters, zeroing them when `reset` is `true`.
    pub fn snapshot(&self, reset: bool) -> LookupProfileSnapshot {
        let load = |counter: &AtomicU64| {
            if reset {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            }
        };
        LookupProfileSnapshot {
            open_ns: load(&self.open_ns),
            open_count: load(&self.open_count),
            next_ns: load(&self.next_ns),
            next_count: load(&self.next_count),
            rows_emitted: load(&self.rows_emitted),
            ancestors_missing: load(&self.ancestors_missing),
            branch_rows_skipped: load(&self.branch_rows_skipped),
            cancellations: load(&self.cancellations),
            cancelled_rows: load(&self.cancelled_rows),
        }
    }
}

impl LookupMetrics for CounterLookupMetrics {
    fn timing(&self, kind: LookupProfileKind, nanos: u64) {
        match kind {
            LookupProfileKind::Open => {
                self.open_ns.fetch_add(nanos, Ordering::Relaxed);
                self.open_count.fetch_add(1, Ordering::Relaxed);
            }
            LookupProfileKind::Next => {
                self.next_ns.fetch_add(nanos, Ordering::Relaxed);
                self.next_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn row_emitted(&self) {
        self.rows_emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn ancestor_missing(&self) {
        self.ancestors_missing.fetch_add(1, Ordering::Relaxed);
    }

    fn branch_row_skipped(&self) {
        self.branch_rows_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn bindings_cancelled(&self, discarded: usize) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
        self.cancelled_rows
            .fetch_add(discarded as u64, Ordering::Relaxed);
    }
}
