use std::collections::HashMap;

use crate::PageId;

/// Capacity floor; smaller requests are clamped up silently.
pub const MIN_CACHED_PAGES: usize = 8;

const NIL: usize = usize::MAX;

struct Node {
    page: PageId,
    prev: usize,
    next: usize,
}

/// Bounded, access-ordered set of page ids.
///
/// Nodes live in a slab and are chained into a doubly-linked list with the most
/// recently used page at the head. Evictions are reported through the
/// `on_evict` callback passed to [`touch`](Self::touch) and
/// [`set_capacity`](Self::set_capacity) before those calls return. The window
/// stays mutably borrowed while the callback runs, so the callback cannot
/// re-enter `touch`.
pub struct RecencyWindow {
    capacity: usize,
    index: HashMap<PageId, usize>,
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl RecencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_CACHED_PAGES),
            index: HashMap::new(),
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, page: PageId) -> bool {
        self.index.contains_key(&page)
    }

    /// Marks `page` most recently used, inserting it when absent.
    pub fn touch<F>(&mut self, page: PageId, mut on_evict: F)
    where
        F: FnMut(PageId),
    {
        if let Some(&slot) = self.index.get(&page) {
            self.detach(slot);
            self.attach_head(slot);
            return;
        }
        let slot = self.alloc(page);
        self.index.insert(page, slot);
        self.attach_head(slot);
        self.evict_over_capacity(&mut on_evict);
    }

    /// Changes the bound (never below [`MIN_CACHED_PAGES`]), evicting from the
    /// LRU end until the window fits.
    pub fn set_capacity<F>(&mut self, capacity: usize, mut on_evict: F)
    where
        F: FnMut(PageId),
    {
        self.capacity = capacity.max(MIN_CACHED_PAGES);
        self.evict_over_capacity(&mut on_evict);
    }

    /// Drops `page` without reporting it as evicted.
    pub fn remove(&mut self, page: PageId) -> bool {
        let Some(slot) = self.index.remove(&page) else {
            return false;
        };
        self.detach(slot);
        self.free.push(slot);
        true
    }

    /// Pages from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = PageId> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            if cursor == NIL {
                return None;
            }
            let node = &self.nodes[cursor];
            cursor = node.next;
            Some(node.page)
        })
    }

    fn evict_over_capacity(&mut self, on_evict: &mut impl FnMut(PageId)) {
        while self.index.len() > self.capacity {
            let Some(page) = self.pop_tail() else {
                break;
            };
            on_evict(page);
        }
    }

    fn alloc(&mut self, page: PageId) -> usize {
        let node = Node {
            page,
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = {
            let node = &self.nodes[slot];
            (node.prev, node.next)
        };
        match prev {
            NIL => self.head = next,
            p => self.nodes[p].next = next,
        }
        match next {
            NIL => self.tail = prev,
            n => self.nodes[n].prev = prev,
        }
        let node = &mut self.nodes[slot];
        node.prev = NIL;
        node.next = NIL;
    }

    fn attach_head(&mut self, slot: usize) {
        self.nodes[slot].next = self.head;
        self.nodes[slot].prev = NIL;
        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }

    fn pop_tail(&mut self) -> Option<PageId> {
        if self.tail == NIL {
            return None;
        }
        let slot = self.tail;
        self.detach(slot);
        let page = self.nodes[slot].page;
        self.index.remove(&page);
        self.free.push(slot);
        Some(page)
    }
}
