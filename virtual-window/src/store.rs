use std::collections::BTreeMap;

use crate::slot::ItemSlot;

/// Target number of slots per backing page; backing pages round this up to a
/// multiple of the fetch page size.
pub const DEFAULT_TARGET_BACKING_PAGE: usize = 100;

/// Sparse slot storage grouped into lazily allocated backing pages.
pub struct PagedItemStore<T> {
    backing_page_size: usize,
    pages: BTreeMap<usize, Box<[Option<ItemSlot<T>>]>>,
}

impl<T> PagedItemStore<T> {
    pub fn new(fetch_page_size: usize, target_backing_page: usize) -> Self {
        Self {
            backing_page_size: backing_page_size(fetch_page_size, target_backing_page),
            pages: BTreeMap::new(),
        }
    }

    pub fn backing_page_size(&self) -> usize {
        self.backing_page_size
    }

    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn get(&self, index: usize) -> Option<&ItemSlot<T>> {
        let (page, offset) = self.locate(index);
        self.pages.get(&page)?[offset].as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ItemSlot<T>> {
        let (page, offset) = self.locate(index);
        self.pages.get_mut(&page)?[offset].as_mut()
    }

    pub fn get_or_create(&mut self, index: usize) -> &mut ItemSlot<T> {
        let (page, offset) = self.locate(index);
        let size = self.backing_page_size;
        let cells = self
            .pages
            .entry(page)
            .or_insert_with(|| empty_page(size));
        cells[offset].get_or_insert_with(|| ItemSlot::new(index))
    }

    pub fn set(&mut self, index: usize, slot: ItemSlot<T>) {
        debug_assert_eq!(slot.index(), index);
        *self.get_or_create(index) = slot;
    }

    /// Drops every slot in `[start, start + count)`. Whole backing pages are
    /// deallocated; partially covered pages are blanked cell by cell.
    pub fn clear_range(&mut self, start: usize, count: usize) {
        if count == 0 {
            return;
        }
        let end = start.saturating_add(count);
        let size = self.backing_page_size;
        let first_page = start / size;
        let last_page = (end - 1) / size;
        let touched: Vec<usize> = self
            .pages
            .range(first_page..=last_page)
            .map(|(page, _)| *page)
            .collect();
        for page in touched {
            let page_start = page * size;
            let page_end = page_start + size;
            if start <= page_start && end >= page_end {
                self.pages.remove(&page);
                continue;
            }
            let lo = start.max(page_start) - page_start;
            let hi = end.min(page_end) - page_start;
            if let Some(cells) = self.pages.get_mut(&page) {
                for cell in &mut cells[lo..hi] {
                    *cell = None;
                }
                if cells.iter().all(Option::is_none) {
                    self.pages.remove(&page);
                }
            }
        }
    }

    /// Allocated slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ItemSlot<T>> {
        self.pages
            .values()
            .flat_map(|cells| cells.iter().filter_map(Option::as_ref))
    }

    fn locate(&self, index: usize) -> (usize, usize) {
        (index / self.backing_page_size, index % self.backing_page_size)
    }
}

fn empty_page<T>(size: usize) -> Box<[Option<ItemSlot<T>>]> {
    (0..size).map(|_| None).collect()
}

/// Smallest multiple of `fetch_page_size` that is at least `target`.
fn backing_page_size(fetch_page_size: usize, target: usize) -> usize {
    let fetch = fetch_page_size.max(1);
    if fetch >= target {
        return fetch;
    }
    target.div_ceil(fetch) * fetch
}
