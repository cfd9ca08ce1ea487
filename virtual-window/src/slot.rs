/// Logical state of an item slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotStatus {
    #[default]
    Unrealized,
    Realized,
    Stale,
    Errored,
}

/// One cell of the virtual sequence.
#[derive(Clone, Debug)]
pub struct ItemSlot<T> {
    index: usize,
    value: Option<T>,
    stale: bool,
    error: bool,
    asked_by_index: bool,
}

impl<T> ItemSlot<T> {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            value: None,
            stale: false,
            error: false,
            asked_by_index: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The fetched value; `None` is the placeholder for unrealized and errored slots.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_realized(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn is_asked_by_index(&self) -> bool {
        self.asked_by_index
    }

    pub fn status(&self) -> SlotStatus {
        if self.error {
            SlotStatus::Errored
        } else if self.value.is_none() {
            SlotStatus::Unrealized
        } else if self.stale {
            SlotStatus::Stale
        } else {
            SlotStatus::Realized
        }
    }

    pub(crate) fn mark_asked_by_index(&mut self) {
        self.asked_by_index = true;
    }

    /// Stores a freshly fetched value, clearing the stale and error flags.
    pub fn supply(&mut self, value: T) {
        self.value = Some(value);
        self.error = false;
        self.stale = false;
    }

    /// Keeps the current value but records that it was confirmed by a fetch.
    pub fn confirm(&mut self) {
        self.stale = false;
        self.error = false;
    }

    pub fn mark_stale(&mut self) {
        if self.value.is_some() {
            self.stale = true;
        }
    }

    /// Drops the value; an errored slot never carries one.
    pub fn mark_error(&mut self) {
        self.value = None;
        self.stale = false;
        self.error = true;
    }

    pub fn clear(&mut self) {
        self.value = None;
        self.stale = false;
        self.error = false;
        self.asked_by_index = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_cycles_through_states() {
        let mut slot = ItemSlot::new(7);
        assert_eq!(slot.index(), 7);
        assert_eq!(slot.status(), SlotStatus::Unrealized);

        slot.supply("a");
        assert_eq!(slot.status(), SlotStatus::Realized);
        slot.mark_stale();
        assert_eq!(slot.status(), SlotStatus::Stale);
        assert_eq!(slot.value(), Some(&"a"));

        slot.mark_error();
        assert_eq!(slot.status(), SlotStatus::Errored);
        assert!(slot.value().is_none());

        slot.supply("b");
        assert_eq!(slot.status(), SlotStatus::Realized);
        assert!(!slot.has_error());
    }

    #[test]
    fn stale_requires_a_value() {
        let mut slot: ItemSlot<u32> = ItemSlot::new(0);
        slot.mark_stale();
        assert!(!slot.is_stale());
    }

    #[test]
    fn clear_resets_everything() {
        let mut slot = ItemSlot::new(3);
        slot.supply(1u8);
        slot.mark_asked_by_index();
        slot.mark_stale();
        slot.clear();
        assert_eq!(slot.status(), SlotStatus::Unrealized);
        assert!(!slot.is_asked_by_index());
        assert_eq!(slot.index(), 3);
    }
}
