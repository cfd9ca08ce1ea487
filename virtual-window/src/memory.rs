//! In-memory [`PageSource`] over a vector.
//!
//! Useful for tests and demos: fetches can be held behind a gate, individual
//! pages can be made to fail, and every fetch and refresh is logged.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use log::debug;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;

use crate::{
    error::BoxError,
    source::{ChangeKind, PageSource, RefreshMode, SortDescription, SourceNotifier},
};

pub struct MemorySource<T> {
    items: RwLock<Vec<T>>,
    count_known: AtomicBool,
    oversize: AtomicUsize,
    failing: Mutex<HashSet<usize>>,
    gate: Option<Arc<Semaphore>>,
    fetches: Mutex<Vec<usize>>,
    refreshes: Mutex<Vec<RefreshMode>>,
    notifier: Mutex<Option<SourceNotifier<T>>>,
}

impl<T> MemorySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            count_known: AtomicBool::new(true),
            oversize: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
            gate: None,
            fetches: Mutex::new(Vec::new()),
            refreshes: Mutex::new(Vec::new()),
            notifier: Mutex::new(None),
        }
    }

    /// Fetches wait for a permit handed out by [`release`](Self::release).
    pub fn gated(items: Vec<T>) -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new(items)
        }
    }

    /// Reports no count until the first page has been served.
    pub fn with_unknown_count(self) -> Self {
        self.count_known.store(false, Ordering::SeqCst);
        self
    }

    /// Answers every fetch with `extra` items beyond the page size.
    pub fn with_oversized_pages(self, extra: usize) -> Self {
        self.oversize.store(extra, Ordering::SeqCst);
        self
    }

    /// Lets `fetches` gated fetches proceed.
    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    pub fn fail_page(&self, start: usize) {
        self.failing.lock().insert(start);
    }

    pub fn heal_page(&self, start: usize) {
        self.failing.lock().remove(&start);
    }

    /// Replaces the data and announces the new count.
    pub fn set_items(&self, items: Vec<T>) {
        *self.items.write() = items;
        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier.count_changed();
        }
    }

    /// Raises a collection change on the attached engine.
    pub fn signal(&self, kind: ChangeKind) {
        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier.collection_changed(kind);
        }
    }

    /// Start indices of every fetch, in the order they began.
    pub fn fetch_log(&self) -> Vec<usize> {
        self.fetches.lock().clone()
    }

    pub fn refresh_log(&self) -> Vec<RefreshMode> {
        self.refreshes.lock().clone()
    }
}

#[async_trait]
impl<T> PageSource<T> for MemorySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn count(&self) -> Option<usize> {
        self.count_known
            .load(Ordering::SeqCst)
            .then(|| self.items.read().len())
    }

    async fn fetch_page(
        &self,
        start: usize,
        page_size: usize,
        _sort: &[SortDescription],
    ) -> Result<Vec<T>, BoxError> {
        self.fetches.lock().push(start);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.failing.lock().contains(&start) {
            return Err(format!("page at {start} unavailable").into());
        }

        let page = {
            let items = self.items.read();
            let end = (start + page_size + self.oversize.load(Ordering::SeqCst)).min(items.len());
            items.get(start..end).map(<[T]>::to_vec).unwrap_or_default()
        };

        if !self.count_known.swap(true, Ordering::SeqCst) {
            if let Some(notifier) = self.notifier.lock().as_ref() {
                notifier.count_changed();
            }
        }
        debug!("memory source served {} items from {}", page.len(), start);
        Ok(page)
    }

    fn refresh(&self, mode: RefreshMode) {
        self.refreshes.lock().push(mode);
        let kind = match mode {
            RefreshMode::ReplaceImmediately => ChangeKind::Reset,
            RefreshMode::PermitStaleWhileRefreshing => ChangeKind::Refresh,
        };
        self.signal(kind);
    }

    fn attach(&self, notifier: SourceNotifier<T>) {
        *self.notifier.lock() = Some(notifier);
    }
}
