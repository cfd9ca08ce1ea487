use std::collections::HashSet;

use crate::{Epoch, PageId};

/// Default cap on concurrently outstanding page fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: PageId,
    pub epoch: Epoch,
    pub prefetch: bool,
}

/// How a finished fetch relates to the engine's current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Current epoch and still requested; the page is now tracked as fetched.
    Accepted,
    /// Issued under an older epoch.
    Stale,
    /// Current epoch, but the page was evicted or serviced meanwhile.
    Superseded,
}

/// Pending-request stack plus requested/fetched page tracking.
///
/// A page is in at most one of the two sets; the stack may still hold entries
/// for pages that have since left the requested set, and those are skipped
/// when drained.
pub struct FetchScheduler {
    max_in_flight: usize,
    in_flight: usize,
    pending: Vec<PageRequest>,
    requested: HashSet<PageId>,
    fetched: HashSet<PageId>,
}

impl FetchScheduler {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            in_flight: 0,
            pending: Vec::new(),
            requested: HashSet::new(),
            fetched: HashSet::new(),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_requested(&self, page: PageId) -> bool {
        self.requested.contains(&page)
    }

    pub fn is_fetched(&self, page: PageId) -> bool {
        self.fetched.contains(&page)
    }

    pub fn is_tracked(&self, page: PageId) -> bool {
        self.is_requested(page) || self.is_fetched(page)
    }

    pub fn fetched_pages(&self) -> impl Iterator<Item = PageId> + '_ {
        self.fetched.iter().copied()
    }

    /// Queues `page` unless it is already fetched or requested. Returns whether
    /// a new request was recorded.
    pub fn request(&mut self, page: PageId, epoch: Epoch, prefetch: bool) -> bool {
        if self.is_tracked(page) {
            return false;
        }
        self.requested.insert(page);
        self.pending.push(PageRequest {
            page,
            epoch,
            prefetch,
        });
        true
    }

    /// Pops requests that may be dispatched now, newest first.
    ///
    /// Meeting a request from another epoch discards the whole stack. Requests
    /// for pages that left the requested set are dropped without using a slot.
    pub fn drain(&mut self, current: Epoch) -> Vec<PageRequest> {
        let mut dispatched = Vec::new();
        while self.in_flight < self.max_in_flight {
            let Some(request) = self.pending.pop() else {
                break;
            };
            if request.epoch != current {
                self.pending.clear();
                break;
            }
            if !self.requested.contains(&request.page) {
                continue;
            }
            self.in_flight += 1;
            dispatched.push(request);
        }
        dispatched
    }

    /// Releases the concurrency slot of a finished fetch and classifies it.
    /// Accepted pages move from requested to fetched.
    pub fn complete(&mut self, request: &PageRequest, current: Epoch) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);
        let completion = self.classify(request, current);
        if completion == Completion::Accepted {
            self.requested.remove(&request.page);
            self.fetched.insert(request.page);
        }
        completion
    }

    /// Like [`complete`](Self::complete) for a failed fetch: an accepted page
    /// only leaves the requested set so a later access can retry it.
    pub fn fail(&mut self, request: &PageRequest, current: Epoch) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);
        let completion = self.classify(request, current);
        if completion == Completion::Accepted {
            self.requested.remove(&request.page);
        }
        completion
    }

    /// Drops every trace of `page`.
    pub fn forget(&mut self, page: PageId) {
        self.requested.remove(&page);
        self.fetched.remove(&page);
    }

    /// Clears page tracking. Queued and in-flight work is left for the epoch
    /// check to discard.
    pub fn clear_tracking(&mut self) {
        self.requested.clear();
        self.fetched.clear();
    }

    fn classify(&self, request: &PageRequest, current: Epoch) -> Completion {
        if request.epoch != current {
            Completion::Stale
        } else if !self.requested.contains(&request.page) {
            Completion::Superseded
        } else {
            Completion::Accepted
        }
    }
}
