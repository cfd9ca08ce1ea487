use tokio::sync::mpsc;

/// Change notification delivered to subscribers, in mutation order.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent<T> {
    /// An index became visible, or a fetched value replaced the previous one.
    Added { index: usize, value: Option<T> },
    /// An index became invisible, or its previous value is being replaced.
    Removed { index: usize, value: Option<T> },
    /// Everything may have changed.
    Reset,
    /// A page fill realized `[start, start + count)`.
    ItemsRealized { start: usize, count: usize },
    /// A page fetch failed and `[start, start + count)` is flagged errored.
    FetchFailed { start: usize, count: usize },
    CountChanged { count: usize },
    CurrentChanged { position: isize },
}

/// Inclusive index range the consumer currently shows. Always ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibleRange {
    first: usize,
    last: usize,
}

impl VisibleRange {
    /// Bounds may be given in either order.
    pub fn new(first: usize, last: usize) -> Self {
        Self {
            first: first.min(last),
            last: first.max(last),
        }
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn last(&self) -> usize {
        self.last
    }
}

/// A pending current-position move offered to the changing guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentChanging {
    pub from: isize,
    pub to: isize,
    pub cancellable: bool,
}

pub type VisibilityQuery = Box<dyn FnMut() -> Option<VisibleRange> + Send>;

/// Returns `false` to veto a cancellable move.
pub type CurrentChangingGuard = Box<dyn FnMut(&CurrentChanging) -> bool + Send>;

pub(crate) struct ChangeNotifier<T> {
    subscribers: Vec<mpsc::UnboundedSender<EngineEvent<T>>>,
}

impl<T: Clone> ChangeNotifier<T> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent<T>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&mut self, event: EngineEvent<T>) {
        self.subscribers.retain(|tx| !tx.is_closed());
        if let Some((last, rest)) = self.subscribers.split_last() {
            for tx in rest {
                let _ = tx.send(event.clone());
            }
            let _ = last.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_events_in_order() {
        let mut notifier: ChangeNotifier<u8> = ChangeNotifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        notifier.emit(EngineEvent::Reset);
        notifier.emit(EngineEvent::CountChanged { count: 4 });
        for rx in [&mut a, &mut b] {
            assert_eq!(rx.try_recv().unwrap(), EngineEvent::Reset);
            assert_eq!(
                rx.try_recv().unwrap(),
                EngineEvent::CountChanged { count: 4 }
            );
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut notifier: ChangeNotifier<u8> = ChangeNotifier::new();
        let rx = notifier.subscribe();
        drop(rx);
        notifier.emit(EngineEvent::Reset);
        assert!(notifier.subscribers.is_empty());
    }

    #[test]
    fn visible_range_is_ordered() {
        let range = VisibleRange::new(9, 3);
        assert_eq!((range.first(), range.last()), (3, 9));
        assert_eq!(range, VisibleRange::new(3, 9));
    }
}
