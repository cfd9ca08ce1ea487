use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    Arc,
};

#[derive(Default)]
struct EngineMetricsInner {
    fetches_dispatched: AtomicU64,
    pages_filled: AtomicU64,
    items_written: AtomicU64,
    fetches_failed: AtomicU64,
    results_stale: AtomicU64,
    results_superseded: AtomicU64,
    results_truncated: AtomicU64,
    pages_evicted: AtomicU64,
    refreshes: AtomicU64,
    source_refreshes: AtomicU64,
    resets: AtomicU64,
    fetches_inflight: AtomicI64,
}

/// Cheap-to-clone counters describing engine activity.
#[derive(Clone, Default)]
pub struct EngineMetrics {
    inner: Arc<EngineMetricsInner>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineMetricsSnapshot {
    pub fetches_dispatched: u64,
    pub pages_filled: u64,
    pub items_written: u64,
    pub fetches_failed: u64,
    pub results_stale: u64,
    pub results_superseded: u64,
    pub results_truncated: u64,
    pub pages_evicted: u64,
    pub refreshes: u64,
    pub source_refreshes: u64,
    pub resets: u64,
    pub fetches_inflight: i64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self) {
        self.inner.fetches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.inner.fetches_inflight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_filled(&self, items_written: usize) {
        self.inner.pages_filled.fetch_add(1, Ordering::Relaxed);
        if items_written > 0 {
            self.inner
                .items_written
                .fetch_add(items_written as u64, Ordering::Relaxed);
        }
        self.finish_inflight();
    }

    pub fn record_fetch_failed(&self) {
        self.inner.fetches_failed.fetch_add(1, Ordering::Relaxed);
        self.finish_inflight();
    }

    pub fn record_stale(&self) {
        self.inner.results_stale.fetch_add(1, Ordering::Relaxed);
        self.finish_inflight();
    }

    pub fn record_superseded(&self) {
        self.inner.results_superseded.fetch_add(1, Ordering::Relaxed);
        self.finish_inflight();
    }

    pub fn record_truncated(&self) {
        self.inner.results_truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.inner.pages_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self, reached_source: bool) {
        self.inner.refreshes.fetch_add(1, Ordering::Relaxed);
        if reached_source {
            self.inner.source_refreshes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reset(&self) {
        self.inner.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            fetches_dispatched: self.inner.fetches_dispatched.load(Ordering::Relaxed),
            pages_filled: self.inner.pages_filled.load(Ordering::Relaxed),
            items_written: self.inner.items_written.load(Ordering::Relaxed),
            fetches_failed: self.inner.fetches_failed.load(Ordering::Relaxed),
            results_stale: self.inner.results_stale.load(Ordering::Relaxed),
            results_superseded: self.inner.results_superseded.load(Ordering::Relaxed),
            results_truncated: self.inner.results_truncated.load(Ordering::Relaxed),
            pages_evicted: self.inner.pages_evicted.load(Ordering::Relaxed),
            refreshes: self.inner.refreshes.load(Ordering::Relaxed),
            source_refreshes: self.inner.source_refreshes.load(Ordering::Relaxed),
            resets: self.inner.resets.load(Ordering::Relaxed),
            fetches_inflight: self.inner.fetches_inflight.load(Ordering::Relaxed),
        }
    }

    fn finish_inflight(&self) {
        self.inner.fetches_inflight.fetch_sub(1, Ordering::Relaxed);
    }
}
