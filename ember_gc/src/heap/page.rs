//! Heap pages.
//!
//! A page is a fixed-capacity array of object slots with an intrusive free
//! list threaded through its `Payload::Free` slots. Pages link into two
//! lists owned by the collector: the list of all pages and the list of
//! pages that still have free slots.

use crate::object::{Payload, Slot};

/// One heap page.
#[derive(Debug)]
pub struct Page {
    /// Object slots.
    pub(crate) slots: Box<[Slot]>,
    /// Head of the intra-page free list (slot index).
    pub(crate) free_head: Option<u32>,
    /// Next page in the all-pages list.
    pub(crate) next: Option<u32>,
    /// Next page in the pages-with-free-slots list.
    pub(crate) free_next: Option<u32>,
    /// Set when a full page survives a minor collection; minor sweeps skip
    /// old pages entirely.
    pub(crate) old: bool,
}

impl Page {
    /// Create a page of `capacity` free slots, free list fully threaded.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        let mut prev: Option<u32> = None;
        for i in 0..capacity {
            let mut slot = Slot::free();
            slot.payload = Payload::Free { next: prev };
            slots.push(slot);
            prev = Some(i as u32);
        }
        Self {
            slots: slots.into_boxed_slice(),
            free_head: prev,
            next: None,
            free_next: None,
            old: false,
        }
    }

    /// Pop a slot off the free list. Returns the slot index.
    pub fn pop_free(&mut self) -> Option<u32> {
        let idx = self.free_head?;
        let next = match self.slots[idx as usize].payload {
            Payload::Free { next } => next,
            // Free-list entries are always Payload::Free.
            _ => None,
        };
        self.free_head = next;
        Some(idx)
    }

    /// Link a freed slot back onto the free list.
    pub fn push_free(&mut self, idx: u32) {
        self.slots[idx as usize].payload = Payload::Free {
            next: self.free_head,
        };
        self.slots[idx as usize].gc_next = None;
        self.slots[idx as usize].class = None;
        self.free_head = Some(idx);
    }

    /// True if the page has at least one free slot.
    #[inline]
    pub fn has_free(&self) -> bool {
        self.free_head.is_some()
    }

    /// True if every slot on the page is free.
    pub fn is_fully_free(&self) -> bool {
        self.slots.iter().all(|s| s.payload.is_free())
    }

    /// Slot capacity of this page.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;

    #[test]
    fn test_new_page_fully_free() {
        let page = Page::new(16);
        assert!(page.has_free());
        assert!(page.is_fully_free());
        assert_eq!(page.capacity(), 16);
    }

    #[test]
    fn test_pop_push_free() {
        let mut page = Page::new(4);

        // Free list was threaded in slot order; the last slot is on top.
        let a = page.pop_free().unwrap();
        assert_eq!(a, 3);
        page.slots[a as usize].payload = crate::object::Payload::new(ObjectKind::Object);
        assert!(!page.is_fully_free());

        let b = page.pop_free().unwrap();
        assert_eq!(b, 2);

        page.push_free(a);
        assert_eq!(page.pop_free(), Some(a));
    }

    #[test]
    fn test_exhaustion() {
        let mut page = Page::new(2);
        assert!(page.pop_free().is_some());
        assert!(page.pop_free().is_some());
        assert_eq!(page.pop_free(), None);
        assert!(!page.has_free());
    }
}
