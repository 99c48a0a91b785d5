use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking group cursor activity.
///
/// Implementations observe every sub-cursor a store hands out, which makes it
/// possible to verify that operators release everything they open.
pub trait StorageMetrics: Send + Sync {
    /// Records a cursor being opened, either as a point lookup or a subtree scan.
    fn cursor_opened(&self, deep: bool);

    /// Records an open cursor being closed.
    fn cursor_closed(&self);

    /// Records a cursor being destroyed.
    fn cursor_destroyed(&self);

    /// Records one row being returned by a cursor.
    fn row_fetched(&self);
}

/// A no-op implementation of [`StorageMetrics`] that discards all recorded metrics.
#[derive(Default)]
pub struct NoopMetrics;

impl StorageMetrics for NoopMetrics {
    fn cursor_opened(&self, _deep: bool) {}
    fn cursor_closed(&self) {}
    fn cursor_destroyed(&self) {}
    fn row_fetched(&self) {}
}

/// A thread-safe counter-based implementation of [`StorageMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Number of point lookups opened.
    pub point_lookups: AtomicU64,

    /// Number of subtree scans opened.
    pub range_scans: AtomicU64,

    /// Number of cursor closes.
    pub closes: AtomicU64,

    /// Number of cursors destroyed.
    pub destroyed: AtomicU64,

    /// Number of rows returned by cursors.
    pub rows_fetched: AtomicU64,
}

impl CounterMetrics {
    /// Number of cursors currently open.
    pub fn open_cursors(&self) -> u64 {
        let opened = self.point_lookups.load(Ordering::Relaxed) + self.range_scans.load(Ordering::Relaxed);
        opened.saturating_sub(self.closes.load(Ordering::Relaxed))
    }

    /// Total cursors opened so far.
    pub fn opened(&self) -> u64 {
        self.point_lookups.load(Ordering::Relaxed) + self.range_scans.load(Ordering::Relaxed)
    }
}

impl StorageMetrics for CounterMetrics {
    fn cursor_opened(&self, deep: bool) {
        if deep {
            self.range_scans.fetch_add(1, Ordering::Relaxed);
        } else {
            self.point_lookups.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn cursor_closed(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    fn cursor_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    fn row_fetched(&self) {
        self.rows_fetched.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the default metrics sink.
pub fn default_metrics() -> Arc<dyn StorageMetrics> {
    Arc::new(NoopMetrics)
}
