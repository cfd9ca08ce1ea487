//! Backing source contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{engine::EngineMessage, error::BoxError};

/// How a refresh treats data that is already on screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshMode {
    /// Clear visible data before the new data arrives.
    ReplaceImmediately,
    /// Keep realized values visible, marked stale, until replaced.
    #[default]
    PermitStaleWhileRefreshing,
}

/// Kind of collection change a source raises.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Current data is invalid and should be cleared.
    Reset,
    /// Current data may still be valid and can be shown while refreshing.
    Refresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    CollectionChanged(ChangeKind),
    CountChanged,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescription {
    pub property: String,
    pub direction: SortDirection,
}

impl SortDescription {
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }
}

/// Handle a source uses to post change events into its engine.
///
/// Events are queued and applied the next time the engine owner pumps its
/// inbox. Posting after the engine is dropped is a no-op.
pub struct SourceNotifier<T> {
    tx: mpsc::UnboundedSender<EngineMessage<T>>,
}

impl<T> Clone for SourceNotifier<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> SourceNotifier<T> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineMessage<T>>) -> Self {
        Self { tx }
    }

    pub fn collection_changed(&self, kind: ChangeKind) {
        self.post(SourceEvent::CollectionChanged(kind));
    }

    pub fn count_changed(&self) {
        self.post(SourceEvent::CountChanged);
    }

    pub fn post(&self, event: SourceEvent) {
        let _ = self.tx.send(EngineMessage::Source(event));
    }
}

/// Slow, page-addressable backing store.
#[async_trait]
pub trait PageSource<T>: Send + Sync + 'static {
    /// Total item count; `None` until a page has been fetched.
    fn count(&self) -> Option<usize>;

    /// Fetches up to `page_size` items starting at `start`. Longer results are
    /// truncated by the engine.
    async fn fetch_page(
        &self,
        start: usize,
        page_size: usize,
        sort: &[SortDescription],
    ) -> Result<Vec<T>, BoxError>;

    /// Asks the source to re-derive its data. Sources answer by posting a
    /// [`SourceEvent`] through the attached notifier.
    fn refresh(&self, mode: RefreshMode);

    /// Hands the source its notifier; called once at engine construction.
    fn attach(&self, _notifier: SourceNotifier<T>) {}
}
