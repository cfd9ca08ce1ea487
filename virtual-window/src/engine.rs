use std::{
    ops::{Deref, DerefMut},
    panic::AssertUnwindSafe,
    sync::Arc,
};

use futures::FutureExt;
use log::{debug, info, warn};
use tokio::{runtime::Handle, sync::mpsc};

use crate::{
    config::EngineConfig,
    error::{EngineError, FetchError, Result},
    events::{
        ChangeNotifier, CurrentChanging, CurrentChangingGuard, EngineEvent, VisibilityQuery,
    },
    metrics::EngineMetrics,
    recency::RecencyWindow,
    scheduler::{Completion, FetchScheduler, PageRequest},
    slot::ItemSlot,
    source::{ChangeKind, PageSource, RefreshMode, SortDescription, SourceEvent, SourceNotifier},
    store::PagedItemStore,
    Epoch, PageId,
};

/// Value identity used to skip rewriting unchanged items.
pub trait ValueComparer<T>: Send {
    fn same(&self, a: &T, b: &T) -> bool;
}

/// Compares with `PartialEq`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultComparer;

impl<T: PartialEq> ValueComparer<T> for DefaultComparer {
    fn same(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// Adapts a closure into a [`ValueComparer`].
#[derive(Clone, Copy, Debug)]
pub struct FnComparer<F>(pub F);

impl<T, F> ValueComparer<T> for FnComparer<F>
where
    F: Fn(&T, &T) -> bool + Send,
{
    fn same(&self, a: &T, b: &T) -> bool {
        (self.0)(a, b)
    }
}

pub(crate) enum EngineMessage<T> {
    PageFetched {
        request: PageRequest,
        result: std::result::Result<Vec<T>, FetchError>,
    },
    Source(SourceEvent),
}

/// Index-addressable view over a paged backing source.
///
/// The engine is the single owner of its store, recency window and scheduler.
/// Fetches run as spawned tokio tasks and post their results to the engine's
/// inbox, as do source events. Nothing is applied until the owner calls
/// [`pump`](Self::pump), [`process_next`](Self::process_next) or
/// [`settle`](Self::settle), so every mutation and notification happens on
/// the owner's context.
pub struct WindowEngine<T, C = DefaultComparer> {
    config: EngineConfig,
    source: Arc<dyn PageSource<T>>,
    comparer: C,
    runtime: Handle,
    store: PagedItemStore<T>,
    recency: RecencyWindow,
    scheduler: FetchScheduler,
    notifier: ChangeNotifier<T>,
    metrics: EngineMetrics,
    inbox_tx: mpsc::UnboundedSender<EngineMessage<T>>,
    inbox: mpsc::UnboundedReceiver<EngineMessage<T>>,
    epoch: Epoch,
    item_count: usize,
    current: isize,
    first_count_change: bool,
    was_refreshed: bool,
    defer_depth: usize,
    deferred_mode: Option<RefreshMode>,
    sort: Arc<[SortDescription]>,
    visibility_query: Option<VisibilityQuery>,
    changing_guard: Option<CurrentChangingGuard>,
}

impl<T> WindowEngine<T, DefaultComparer>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(source: Arc<dyn PageSource<T>>, config: EngineConfig) -> Result<Self> {
        Self::with_comparer(source, config, DefaultComparer)
    }
}

impl<T, C> WindowEngine<T, C>
where
    T: Clone + Send + 'static,
    C: ValueComparer<T>,
{
    /// Must be called from within a tokio runtime; fetches are spawned on it.
    pub fn with_comparer(
        source: Arc<dyn PageSource<T>>,
        config: EngineConfig,
        comparer: C,
    ) -> Result<Self> {
        if config.page_size == 0 {
            return Err(EngineError::InvalidPageSize);
        }
        let runtime = Handle::try_current().map_err(|_| EngineError::MissingRuntime)?;
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        source.attach(SourceNotifier::new(inbox_tx.clone()));
        Ok(Self {
            store: PagedItemStore::new(config.page_size, config.target_backing_page),
            recency: RecencyWindow::new(config.cached_pages),
            scheduler: FetchScheduler::new(config.max_concurrent_fetches),
            config,
            source,
            comparer,
            runtime,
            notifier: ChangeNotifier::new(),
            metrics: EngineMetrics::new(),
            inbox_tx,
            inbox,
            epoch: 0,
            item_count: 0,
            current: -1,
            first_count_change: true,
            was_refreshed: false,
            defer_depth: 0,
            deferred_mode: None,
            sort: Arc::from(Vec::new()),
            visibility_query: None,
            changing_guard: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.metrics.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub fn is_busy(&self) -> bool {
        self.scheduler.in_flight() > 0 || self.scheduler.pending() > 0
    }

    pub fn is_page_fetched(&self, page: PageId) -> bool {
        self.scheduler.is_fetched(page)
    }

    pub fn is_page_requested(&self, page: PageId) -> bool {
        self.scheduler.is_requested(page)
    }

    pub fn cached_pages(&self) -> usize {
        self.recency.capacity()
    }

    pub fn resident_pages(&self) -> usize {
        self.recency.len()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent<T>> {
        self.notifier.subscribe()
    }

    /// Installs the callback asked for the on-screen range when the source
    /// refreshes its data.
    pub fn set_visibility_query<F>(&mut self, query: F)
    where
        F: FnMut() -> Option<crate::events::VisibleRange> + Send + 'static,
    {
        self.visibility_query = Some(Box::new(query));
    }

    pub fn set_current_changing_guard<F>(&mut self, guard: F)
    where
        F: FnMut(&CurrentChanging) -> bool + Send + 'static,
    {
        self.changing_guard = Some(Box::new(guard));
    }

    /// Cached item count without consulting the source.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Item count, re-derived from the source while the cached count is zero.
    pub fn count(&mut self) -> usize {
        if self.item_count == 0 {
            self.update_count_from_source();
        }
        self.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// Slot at `index` without triggering any fetch.
    pub fn peek(&self, index: usize) -> Option<&ItemSlot<T>> {
        self.store.get(index)
    }

    /// Direct (random) access: realizes the owning page plus its neighbours
    /// and marks the slot as explicitly requested.
    pub fn get(&mut self, index: usize) -> Result<&ItemSlot<T>> {
        let count = self.count();
        if index >= count {
            return Err(EngineError::IndexOutOfRange { index, count });
        }
        self.realize(index, true);
        let slot = self.store.get_or_create(index);
        slot.mark_asked_by_index();
        Ok(&*slot)
    }

    /// Sequential access: fetches without prefetch, and only for slots that
    /// were asked for by index and have neither a value nor an error.
    pub fn item(&mut self, index: usize) -> Option<&T> {
        let wanted = self.store.get(index).is_some_and(|slot| {
            slot.is_asked_by_index() && !slot.is_realized() && !slot.has_error()
        });
        if wanted {
            self.realize(index, false);
        }
        self.store.get(index).and_then(ItemSlot::value)
    }

    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.store
            .iter()
            .find(|slot| slot.value().is_some_and(|v| self.comparer.same(v, value)))
            .map(ItemSlot::index)
    }

    /// Requests the page owning `index`. Direct access also prefetches the
    /// previous and next pages, in that order after the page itself.
    pub fn realize(&mut self, index: usize, direct: bool) {
        let page = index / self.config.page_size;
        self.request_page(page, false);
        if direct {
            if page > 0 {
                self.request_page(page - 1, true);
            }
            self.request_page(page + 1, true);
        }
    }

    /// Grows or shrinks the recency window, evicting pages as needed.
    pub fn set_cached_pages(&mut self, pages: usize) {
        let Self {
            recency,
            scheduler,
            store,
            metrics,
            config,
            ..
        } = self;
        recency.set_capacity(pages, |evicted| {
            release_page(scheduler, store, metrics, config, evicted)
        });
    }

    /// Forgets `page`, drops it from the recency window and clears its slots.
    /// A fetch still in flight for it will complete as superseded.
    pub fn evict_page(&mut self, page: PageId) {
        self.recency.remove(page);
        release_page(
            &mut self.scheduler,
            &mut self.store,
            &self.metrics,
            &self.config,
            page,
        );
    }

    pub fn refresh(&mut self, mode: RefreshMode) {
        self.epoch += 1;
        match mode {
            RefreshMode::PermitStaleWhileRefreshing => self.mark_fetched_stale(),
            RefreshMode::ReplaceImmediately => self.clear_fetched_slots(),
        }
        self.scheduler.clear_tracking();
        self.item_count = 0;
        self.first_count_change = true;
        self.was_refreshed = true;

        let reached_source = self.defer_depth == 0;
        if reached_source {
            debug!(
                "[{}] refreshing source ({:?}) at epoch {}",
                self.config.label, mode, self.epoch
            );
            self.source.refresh(mode);
        } else {
            self.deferred_mode = Some(match (self.deferred_mode, mode) {
                (Some(RefreshMode::ReplaceImmediately), _) => RefreshMode::ReplaceImmediately,
                (_, mode) => mode,
            });
        }
        self.metrics.record_refresh(reached_source);
    }

    /// Suppresses source refreshes until the returned guard is dropped, at
    /// which point a single refresh is issued.
    pub fn defer_refresh(&mut self) -> RefreshDeferral<'_, T, C> {
        self.defer_depth += 1;
        RefreshDeferral { engine: self }
    }

    pub fn set_sort(&mut self, sort: Vec<SortDescription>) {
        self.sort = Arc::from(sort);
        self.refresh(RefreshMode::PermitStaleWhileRefreshing);
    }

    pub fn sort(&self) -> &[SortDescription] {
        &self.sort
    }

    /// Drops everything previously fetched and re-derives the count.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.clear_fetched_slots();
        self.scheduler.clear_tracking();
        self.current = -1;
        self.update_count(0);
        // the drop to zero above consumes the flag; regrowth must still be bulk
        self.first_count_change = true;
        self.update_count_from_source();
        self.notifier.emit(EngineEvent::Reset);
        self.metrics.record_reset();
        info!(
            "[{}] reset to epoch {}; {} items",
            self.config.label, self.epoch, self.item_count
        );
    }

    /// Reconciles the item count, emitting either one reset or one
    /// notification per index that appeared or disappeared.
    pub fn update_count(&mut self, count: usize) {
        if self.item_count == count && !self.was_refreshed {
            return;
        }
        self.was_refreshed = false;

        let was_after_last = self.is_current_after_last();
        let original = self.item_count;
        self.item_count = count;
        if self.is_current_after_last() && !was_after_last {
            self.update_current_position(count as isize - 1, false);
        }
        self.notifier.emit(EngineEvent::CountChanged { count });

        let delta = count.abs_diff(original);
        let grew = count > original;
        if (grew && self.first_count_change)
            || delta > self.config.individual_notification_limit
            || count == 0
        {
            self.first_count_change = false;
            self.notifier.emit(EngineEvent::Reset);
        } else if grew {
            for index in original..count {
                let value = self.store.get(index).and_then(ItemSlot::value).cloned();
                self.notifier.emit(EngineEvent::Added { index, value });
            }
        } else {
            for index in (count..original).rev() {
                let value = self.store.get(index).and_then(ItemSlot::value).cloned();
                self.notifier.emit(EngineEvent::Removed { index, value });
            }
        }
    }

    pub fn current_position(&self) -> isize {
        self.current
    }

    pub fn is_current_before_first(&self) -> bool {
        self.current < 0
    }

    pub fn is_current_after_last(&self) -> bool {
        self.current >= self.item_count as isize
    }

    pub fn current_item(&mut self) -> Option<&T> {
        if self.is_current_before_first() || self.is_current_after_last() {
            return None;
        }
        self.item(self.current as usize)
    }

    pub fn move_current_to_first(&mut self) -> bool {
        self.update_current_position(0, true)
    }

    pub fn move_current_to_last(&mut self) -> bool {
        self.update_current_position(self.item_count as isize - 1, true)
    }

    pub fn move_current_to_next(&mut self) -> bool {
        self.update_current_position(self.current + 1, true)
    }

    pub fn move_current_to_previous(&mut self) -> bool {
        self.update_current_position(self.current - 1, true)
    }

    pub fn move_current_to_position(&mut self, position: isize) -> bool {
        self.update_current_position(position, true)
    }

    /// Moves to the resident slot holding `value`, or before the first item
    /// when no resident slot matches.
    pub fn move_current_to(&mut self, value: &T) -> bool {
        let position = self.index_of(value).map_or(-1, |index| index as isize);
        self.update_current_position(position, true)
    }

    /// Applies every queued fetch result and source event without waiting.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    /// Waits for the next fetch result or source event and applies it.
    pub async fn process_next(&mut self) {
        if let Some(message) = self.inbox.recv().await {
            self.apply(message);
        }
    }

    /// Runs until no fetch is queued or in flight.
    pub async fn settle(&mut self) {
        loop {
            self.pump();
            self.drain();
            if self.scheduler.in_flight() == 0 {
                break;
            }
            self.process_next().await;
        }
    }

    fn update_current_position(&mut self, position: isize, cancellable: bool) -> bool {
        let changing = CurrentChanging {
            from: self.current,
            to: position,
            cancellable,
        };
        let allowed = match self.changing_guard.as_mut() {
            Some(guard) => guard(&changing) || !cancellable,
            None => true,
        };
        if allowed {
            self.current = position;
            self.notifier
                .emit(EngineEvent::CurrentChanged { position });
        }
        !self.is_current_before_first() && !self.is_current_after_last()
    }

    fn update_count_from_source(&mut self) {
        match self.source.count() {
            Some(count) => self.update_count(count),
            // the source learns its count by serving a page
            None => self.request_page(0, false),
        }
    }

    fn request_page(&mut self, page: PageId, prefetch: bool) {
        if self.scheduler.is_tracked(page) {
            if !prefetch && self.recency.contains(page) {
                self.touch_page(page);
            }
            return;
        }
        self.touch_page(page);
        self.scheduler.request(page, self.epoch, prefetch);
        self.drain();
    }

    fn touch_page(&mut self, page: PageId) {
        let Self {
            recency,
            scheduler,
            store,
            metrics,
            config,
            ..
        } = self;
        recency.touch(page, |evicted| {
            release_page(scheduler, store, metrics, config, evicted)
        });
    }

    fn drain(&mut self) {
        for request in self.scheduler.drain(self.epoch) {
            self.dispatch(request);
        }
    }

    fn dispatch(&self, request: PageRequest) {
        let page_size = self.config.page_size;
        let start = request.page * page_size;
        let source = Arc::clone(&self.source);
        let sort = Arc::clone(&self.sort);
        let tx = self.inbox_tx.clone();
        self.metrics.record_dispatch();
        debug!(
            "[{}] fetching page {} (prefetch={}, epoch={})",
            self.config.label, request.page, request.prefetch, request.epoch
        );
        self.runtime.spawn(async move {
            let outcome = AssertUnwindSafe(source.fetch_page(start, page_size, &sort))
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(Ok(items)) => Ok(items),
                Ok(Err(err)) => Err(FetchError::Source(err)),
                Err(_) => Err(FetchError::Panicked),
            };
            let _ = tx.send(EngineMessage::PageFetched { request, result });
        });
    }

    fn apply(&mut self, message: EngineMessage<T>) {
        match message {
            EngineMessage::PageFetched {
                request,
                result: Ok(items),
            } => {
                self.on_page_fetched(request, items);
                self.drain();
            }
            EngineMessage::PageFetched {
                request,
                result: Err(err),
            } => {
                self.on_page_failed(request, err);
                self.drain();
            }
            EngineMessage::Source(event) => self.on_source_event(event),
        }
    }

    fn on_page_fetched(&mut self, request: PageRequest, mut items: Vec<T>) {
        match self.scheduler.complete(&request, self.epoch) {
            Completion::Stale => {
                self.metrics.record_stale();
                debug!(
                    "[{}] dropped page {} from epoch {} (now {})",
                    self.config.label, request.page, request.epoch, self.epoch
                );
                return;
            }
            Completion::Superseded => {
                self.metrics.record_superseded();
                debug!(
                    "[{}] dropped superseded page {}",
                    self.config.label, request.page
                );
                return;
            }
            Completion::Accepted => {}
        }

        let page_size = self.config.page_size;
        if items.len() > page_size {
            warn!(
                "[{}] source returned {} items for page {}; truncating to {}",
                self.config.label,
                items.len(),
                request.page,
                page_size
            );
            items.truncate(page_size);
            self.metrics.record_truncated();
        }

        let start = request.page * page_size;
        let count = items.len();
        let mut written = 0usize;
        for (offset, value) in items.into_iter().enumerate() {
            let index = start + offset;
            let slot = self.store.get_or_create(index);
            let unchanged = slot
                .value()
                .is_some_and(|existing| self.comparer.same(existing, &value));
            if unchanged {
                slot.confirm();
                continue;
            }
            let notify = !request.prefetch || slot.is_asked_by_index();
            let previous = slot.value().cloned();
            written += 1;
            if notify {
                slot.supply(value.clone());
                self.notifier.emit(EngineEvent::Removed {
                    index,
                    value: previous,
                });
                self.notifier.emit(EngineEvent::Added {
                    index,
                    value: Some(value),
                });
            } else {
                slot.supply(value);
            }
        }

        // a shorter page than last time leaves nothing behind its new end
        if count < page_size {
            self.store.clear_range(start + count, page_size - count);
        }

        if count > 0 {
            self.notifier
                .emit(EngineEvent::ItemsRealized { start, count });
        }
        self.metrics.record_page_filled(written);
    }

    fn on_page_failed(&mut self, request: PageRequest, err: FetchError) {
        match self.scheduler.fail(&request, self.epoch) {
            Completion::Stale => {
                self.metrics.record_stale();
                return;
            }
            Completion::Superseded => {
                self.metrics.record_superseded();
                return;
            }
            Completion::Accepted => {}
        }
        let page_size = self.config.page_size;
        let start = request.page * page_size;
        let mut end = start + page_size;
        if self.item_count > 0 {
            end = end.min(self.item_count).max(start);
        }
        for index in start..end {
            self.store.get_or_create(index).mark_error();
        }
        self.metrics.record_fetch_failed();
        warn!(
            "[{}] page {} failed to load: {}",
            self.config.label, request.page, err
        );
        self.notifier.emit(EngineEvent::FetchFailed {
            start,
            count: end - start,
        });
    }

    fn on_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::CollectionChanged(ChangeKind::Refresh) => self.update_data(),
            SourceEvent::CollectionChanged(ChangeKind::Reset) => {
                if self.scheduler.fetched_pages().next().is_some() || self.item_count != 0 {
                    self.reset();
                } else {
                    self.update_count_from_source();
                }
            }
            SourceEvent::CountChanged => self.update_count_from_source(),
        }
    }

    /// Source data changed but may still be shown: keep it as stale, then
    /// fetch whatever the consumer has on screen.
    fn update_data(&mut self) {
        self.epoch += 1;
        self.mark_fetched_stale();
        self.scheduler.clear_tracking();
        self.update_count_from_source();

        let visible = self.visibility_query.as_mut().and_then(|query| query());
        match visible {
            Some(range) => {
                let first_page = range.first() / self.config.page_size;
                let last_page = range.last() / self.config.page_size;
                let visible_pages = last_page - first_page + 1;
                if self.recency.capacity() < visible_pages {
                    self.set_cached_pages(visible_pages);
                }
                for page in first_page..=last_page {
                    self.request_page(page, false);
                }
            }
            // nothing tells us what is on screen; let the consumer re-request
            None => self.notifier.emit(EngineEvent::Reset),
        }
    }

    fn mark_fetched_stale(&mut self) {
        let page_size = self.config.page_size;
        for page in self.scheduler.fetched_pages() {
            let start = page * page_size;
            for index in start..start + page_size {
                if let Some(slot) = self.store.get_mut(index) {
                    slot.mark_stale();
                }
            }
        }
    }

    fn clear_fetched_slots(&mut self) {
        let page_size = self.config.page_size;
        for page in self.scheduler.fetched_pages() {
            let start = page * page_size;
            for index in start..start + page_size {
                if let Some(slot) = self.store.get_mut(index) {
                    slot.clear();
                }
            }
        }
    }

    fn release_deferral(&mut self) {
        self.defer_depth = self.defer_depth.saturating_sub(1);
        if self.defer_depth == 0 {
            let mode = self.deferred_mode.take().unwrap_or_default();
            self.refresh(mode);
        }
    }
}

fn release_page<T>(
    scheduler: &mut FetchScheduler,
    store: &mut PagedItemStore<T>,
    metrics: &EngineMetrics,
    config: &EngineConfig,
    page: PageId,
) {
    scheduler.forget(page);
    store.clear_range(page * config.page_size, config.page_size);
    metrics.record_eviction();
    debug!("[{}] evicted page {}", config.label, page);
}

/// Guard returned by [`WindowEngine::defer_refresh`].
///
/// Dereferences to the engine. Dropping the outermost guard, including during
/// unwinding, issues one refresh using the strongest mode requested while it
/// was held.
pub struct RefreshDeferral<'a, T, C>
where
    T: Clone + Send + 'static,
    C: ValueComparer<T>,
{
    engine: &'a mut WindowEngine<T, C>,
}

impl<T, C> Deref for RefreshDeferral<'_, T, C>
where
    T: Clone + Send + 'static,
    C: ValueComparer<T>,
{
    type Target = WindowEngine<T, C>;

    fn deref(&self) -> &Self::Target {
        &*self.engine
    }
}

impl<T, C> DerefMut for RefreshDeferral<'_, T, C>
where
    T: Clone + Send + 'static,
    C: ValueComparer<T>,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.engine
    }
}

impl<T, C> Drop for RefreshDeferral<'_, T, C>
where
    T: Clone + Send + 'static,
    C: ValueComparer<T>,
{
    fn drop(&mut self) {
        self.engine.release_deferral();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::BoxError, events::EngineEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Source with a fixed count that never answers a fetch.
    struct CountOnly {
        count: Mutex<Option<usize>>,
        refreshes: Mutex<usize>,
    }

    impl CountOnly {
        fn new(count: usize) -> Arc<Self> {
            Arc::new(Self {
                count: Mutex::new(Some(count)),
                refreshes: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl PageSource<u32> for CountOnly {
        fn count(&self) -> Option<usize> {
            *self.count.lock()
        }

        async fn fetch_page(
            &self,
            _start: usize,
            _page_size: usize,
            _sort: &[SortDescription],
        ) -> std::result::Result<Vec<u32>, BoxError> {
            futures::future::pending().await
        }

        fn refresh(&self, _mode: RefreshMode) {
            *self.refreshes.lock() += 1;
        }
    }

    fn drain_events(rx: &mut mpsc::UnboundedReceiver<EngineEvent<u32>>) -> Vec<EngineEvent<u32>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn rejects_zero_page_size() {
        let err = WindowEngine::<u32>::new(CountOnly::new(1), EngineConfig::new(0))
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::InvalidPageSize));
    }

    #[test]
    fn requires_runtime() {
        let err = WindowEngine::<u32>::new(CountOnly::new(1), EngineConfig::new(10))
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::MissingRuntime));
    }

    #[tokio::test]
    async fn count_thresholds() {
        let mut engine = WindowEngine::<u32>::new(CountOnly::new(0), EngineConfig::new(10)).unwrap();
        let mut rx = engine.subscribe();

        engine.update_count(1);
        let events = drain_events(&mut rx);
        assert_eq!(
            events,
            vec![EngineEvent::CountChanged { count: 1 }, EngineEvent::Reset]
        );

        engine.update_count(1000);
        assert!(drain_events(&mut rx).contains(&EngineEvent::Reset));

        engine.update_count(950);
        let removed: Vec<usize> = drain_events(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::Removed { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(removed.len(), 50);
        assert_eq!(removed.first(), Some(&999));
        assert_eq!(removed.last(), Some(&950));

        engine.update_count(960);
        let added = drain_events(&mut rx)
            .into_iter()
            .filter(|event| matches!(event, EngineEvent::Added { .. }))
            .count();
        assert_eq!(added, 10);

        engine.update_count(500);
        let events = drain_events(&mut rx);
        assert_eq!(
            events,
            vec![EngineEvent::CountChanged { count: 500 }, EngineEvent::Reset]
        );

        engine.update_count(0);
        assert!(drain_events(&mut rx).contains(&EngineEvent::Reset));
    }

    #[tokio::test]
    async fn shrink_past_current_moves_to_last_even_if_vetoed() {
        let mut engine = WindowEngine::<u32>::new(CountOnly::new(0), EngineConfig::new(10)).unwrap();
        engine.update_count(20);
        assert!(engine.move_current_to_position(15));
        engine.set_current_changing_guard(|_| false);
        engine.move_current_to_first();
        assert_eq!(engine.current_position(), 15);

        engine.update_count(10);
        assert_eq!(engine.current_position(), 9);
    }

    #[tokio::test]
    async fn deferred_refreshes_coalesce() {
        let source = CountOnly::new(40);
        let mut engine = WindowEngine::<u32>::new(source.clone(), EngineConfig::new(10)).unwrap();
        {
            let mut deferral = engine.defer_refresh();
            for _ in 0..5 {
                deferral.refresh(RefreshMode::PermitStaleWhileRefreshing);
            }
            {
                let mut nested = deferral.defer_refresh();
                nested.refresh(RefreshMode::ReplaceImmediately);
            }
            assert_eq!(*source.refreshes.lock(), 0);
        }
        assert_eq!(*source.refreshes.lock(), 1);
        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.source_refreshes, 1);
        assert_eq!(snapshot.refreshes, 7);
    }

    #[tokio::test]
    async fn get_rejects_out_of_range() {
        let mut engine = WindowEngine::<u32>::new(CountOnly::new(5), EngineConfig::new(10)).unwrap();
        let err = engine.get(5).err().unwrap();
        assert!(matches!(
            err,
            EngineError::IndexOutOfRange { index: 5, count: 5 }
        ));
    }

    #[tokio::test]
    async fn realize_caps_concurrency() {
        let mut engine = WindowEngine::<u32>::new(CountOnly::new(1_000), EngineConfig::new(10)).unwrap();
        for index in (0..200).step_by(10) {
            engine.realize(index, false);
        }
        assert_eq!(engine.in_flight(), 3);
        assert!(engine.is_busy());
        assert_eq!(engine.metrics().snapshot().fetches_dispatched, 3);
    }
}
