//! Collector state and page allocator.
//!
//! [`Gc`] is the per-runtime collector record: the page table, the free-page
//! list, gray worklist heads, live counters, thresholds, mode flags, the
//! bounded protection arena and the root table. One `Gc` exists per runtime
//! instance; independent runtimes never share collector state.

mod page;

pub use page::Page;

use crate::config::{GcConfig, MAJOR_TOO_MANY, STEP_UNIT};
use crate::object::{ObjectKind, Payload, Slot};
use crate::stats::GcStats;
use crate::{Color, GcState};
use ember_core::ObjRef;

/// Per-runtime collector state.
///
/// Heap pages are exclusively owned by this record; only the allocator and
/// the sweeper ever mutate page linkage.
#[derive(Debug)]
pub struct Gc {
    pub(crate) config: GcConfig,

    // =========================================================================
    // Page table
    // =========================================================================
    /// Page slab; `None` entries are released pages awaiting reuse.
    pages: Vec<Option<Box<Page>>>,
    /// Released slab indices available for new pages.
    vacant_pages: Vec<u32>,
    /// Head of the all-pages list.
    pub(crate) heaps: Option<u32>,
    /// Head of the pages-with-free-slots list.
    pub(crate) free_heaps: Option<u32>,
    /// Sweep resume point: last page fully processed this sweep phase.
    pub(crate) sweep_cursor: Option<u32>,

    // =========================================================================
    // Cycle state
    // =========================================================================
    /// Which white shade currently means "newly created"; the other shade
    /// is the sweep target.
    pub(crate) current_white: Color,
    /// Collector phase.
    pub(crate) state: GcState,
    /// Head of the primary gray worklist (intrusive via `Slot::gc_next`).
    pub(crate) gray_head: Option<ObjRef>,
    /// Head of the atomic gray worklist, drained only by the final
    /// (uncapped) mark step.
    pub(crate) atomic_gray_head: Option<ObjRef>,

    // =========================================================================
    // Accounting
    // =========================================================================
    /// Live object count.
    pub(crate) live: usize,
    /// Live count captured when marking finished, maintained through sweep.
    pub(crate) live_after_mark: usize,
    /// Allocation threshold: a step runs when `live` exceeds it.
    pub(crate) threshold: usize,
    /// Old-generation ceiling; exceeding it triggers a major collection.
    pub(crate) oldgen_threshold: usize,
    /// Interval ratio in percent (see [`GcConfig::interval_ratio`]).
    pub(crate) interval_ratio: usize,
    /// Step ratio in percent (see [`GcConfig::step_ratio`]).
    pub(crate) step_ratio: usize,

    // =========================================================================
    // Mode flags
    // =========================================================================
    /// Generational mode active.
    pub(crate) generational: bool,
    /// In generational mode: the current cycle is a major one.
    pub(crate) full: bool,
    /// Collection suppressed entirely.
    pub(crate) disabled: bool,
    /// A full-heap enumeration callback is active.
    pub(crate) iterating: bool,
    /// Last allocation failed for lack of storage.
    pub(crate) out_of_memory: bool,

    // =========================================================================
    // Pinning
    // =========================================================================
    /// Bounded protection arena (stack discipline).
    pub(crate) arena: Vec<ObjRef>,
    /// Unbounded root table (register/unregister discipline).
    pub(crate) roots: Vec<ObjRef>,

    /// Activity counters.
    pub(crate) stats: GcStats,
}

impl Gc {
    /// Create collector state with one empty page.
    ///
    /// Panics if the configuration is invalid; validate first when the
    /// values come from an untrusted source.
    pub fn new(config: GcConfig) -> Self {
        config.validate().expect("invalid GC configuration");

        let interval_ratio = config.interval_ratio;
        let step_ratio = config.step_ratio;
        let generational = config.generational;
        let arena = Vec::with_capacity(config.arena_capacity);

        let mut gc = Self {
            config,
            pages: Vec::new(),
            vacant_pages: Vec::new(),
            heaps: None,
            free_heaps: None,
            sweep_cursor: None,
            current_white: Color::WhiteA,
            state: GcState::Root,
            gray_head: None,
            atomic_gray_head: None,
            live: 0,
            live_after_mark: 0,
            threshold: STEP_UNIT,
            oldgen_threshold: MAJOR_TOO_MANY,
            interval_ratio,
            step_ratio,
            generational,
            // A generational heap starts with a major cycle pending, so the
            // first completed cycle establishes the old generation.
            full: generational,
            disabled: false,
            iterating: false,
            out_of_memory: false,
            arena,
            roots: Vec::new(),
            stats: GcStats::new(),
        };
        gc.add_page();
        gc
    }

    // =========================================================================
    // Page allocator
    // =========================================================================

    /// Create a new page and link it onto both page lists.
    pub(crate) fn add_page(&mut self) {
        let page = Box::new(Page::new(self.config.page_capacity));
        let idx = match self.vacant_pages.pop() {
            Some(idx) => {
                self.pages[idx as usize] = Some(page);
                idx
            }
            None => {
                self.pages.push(Some(page));
                (self.pages.len() - 1) as u32
            }
        };

        let page = self.pages[idx as usize].as_mut().expect("page just added");
        page.next = self.heaps;
        self.heaps = Some(idx);
        page.free_next = self.free_heaps;
        self.free_heaps = Some(idx);

        self.stats.pages_created += 1;
        log::debug!("heap: added page {idx} ({} slots)", self.config.page_capacity);
    }

    /// Take a free slot from the first page with availability.
    ///
    /// The caller must ensure `free_heaps` is non-empty (creating a page if
    /// needed) and is responsible for initializing the slot header.
    pub(crate) fn allocate_slot(&mut self) -> ObjRef {
        let page_idx = self.free_heaps.expect("allocate_slot without a free page");
        let page = self.pages[page_idx as usize]
            .as_mut()
            .expect("free-page list holds a released page");
        let slot_idx = page.pop_free().expect("free-page list holds a full page");
        if !page.has_free() {
            self.free_heaps = page.free_next;
        }
        ObjRef::new(page_idx, slot_idx)
    }

    /// Release a fully dead page back to the slab. Linkage must already be
    /// fixed up by the caller (the sweeper).
    pub(crate) fn release_page(&mut self, idx: u32) {
        self.pages[idx as usize] = None;
        self.vacant_pages.push(idx);
        self.stats.pages_released += 1;
        log::debug!("heap: released page {idx}");
    }

    /// Number of live pages.
    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }

    /// Total slot capacity across live pages.
    pub fn total_slots(&self) -> usize {
        self.page_count() * self.config.page_capacity
    }

    // =========================================================================
    // Slot access
    // =========================================================================

    /// Resolve a handle to its slot, if the page still exists.
    #[inline]
    pub(crate) fn slot(&self, r: ObjRef) -> Option<&Slot> {
        self.pages
            .get(r.page() as usize)?
            .as_ref()?
            .slots
            .get(r.slot() as usize)
    }

    /// Mutable slot access.
    #[inline]
    pub(crate) fn slot_mut(&mut self, r: ObjRef) -> Option<&mut Slot> {
        self.pages
            .get_mut(r.page() as usize)?
            .as_mut()?
            .slots
            .get_mut(r.slot() as usize)
    }

    /// Borrow a page by index.
    #[inline]
    pub(crate) fn page(&self, idx: u32) -> Option<&Page> {
        self.pages.get(idx as usize)?.as_deref()
    }

    /// Mutable page access.
    #[inline]
    pub(crate) fn page_mut(&mut self, idx: u32) -> Option<&mut Page> {
        self.pages.get_mut(idx as usize)?.as_deref_mut()
    }

    /// Kind of the object behind a handle, if it resolves.
    pub fn kind_of(&self, r: ObjRef) -> Option<ObjectKind> {
        self.slot(r).map(Slot::kind)
    }

    // =========================================================================
    // Color predicates
    // =========================================================================

    /// The white shade that is condemned this cycle.
    #[inline]
    pub(crate) fn condemned_white(&self) -> Color {
        self.current_white.other_white()
    }

    /// Swap the meaning of the two white shades (O(1); run at ROOT).
    #[inline]
    pub(crate) fn flip_white(&mut self) {
        self.current_white = self.condemned_white();
    }

    /// True if a slot is dead: condemned white, or already free.
    #[inline]
    pub(crate) fn slot_is_dead(&self, slot: &Slot) -> bool {
        slot.color == self.condemned_white() || slot.payload.is_free()
    }

    /// True if the handle no longer refers to a live object.
    ///
    /// Diagnostic API: a handle outside the heap, on a released page, or at
    /// a condemned/free slot is dead.
    pub fn is_object_dead(&self, r: ObjRef) -> bool {
        match self.slot(r) {
            Some(slot) => self.slot_is_dead(slot),
            None => true,
        }
    }

    // =========================================================================
    // Mode predicates
    // =========================================================================

    /// True when generational mode is active.
    #[inline]
    pub fn is_generational(&self) -> bool {
        self.generational
    }

    /// True during a generational major cycle.
    #[inline]
    pub(crate) fn is_major(&self) -> bool {
        self.generational && self.full
    }

    /// True during a generational minor cycle.
    #[inline]
    pub(crate) fn is_minor(&self) -> bool {
        self.generational && !self.full
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Page indices in list order (sweep order).
    pub(crate) fn page_indices(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.page_count());
        let mut cursor = self.heaps;
        while let Some(idx) = cursor {
            order.push(idx);
            cursor = self.page(idx).and_then(|p| p.next);
        }
        order
    }

    /// Every non-free slot handle, in page order.
    pub(crate) fn live_handles(&self) -> Vec<ObjRef> {
        let mut handles = Vec::new();
        for page_idx in self.page_indices() {
            let page = match self.page(page_idx) {
                Some(p) => p,
                None => continue,
            };
            for (slot_idx, slot) in page.slots.iter().enumerate() {
                if !slot.payload.is_free() {
                    handles.push(ObjRef::new(page_idx, slot_idx as u32));
                }
            }
        }
        handles
    }

    /// Live object count.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Activity counters.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Current collector phase.
    pub fn state(&self) -> GcState {
        self.state
    }

    /// Replace a slot's payload, returning the old one. Used by the sweeper
    /// and by end-of-world teardown.
    pub(crate) fn take_payload(&mut self, r: ObjRef) -> Option<Payload> {
        let slot = self.slot_mut(r)?;
        Some(std::mem::replace(
            &mut slot.payload,
            Payload::Free { next: None },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_gc_has_one_page() {
        let gc = Gc::new(GcConfig::default());
        assert_eq!(gc.page_count(), 1);
        assert!(gc.free_heaps.is_some());
        assert_eq!(gc.live_count(), 0);
    }

    #[test]
    fn test_allocate_slot_until_page_full() {
        let mut gc = Gc::new(GcConfig {
            page_capacity: 16,
            ..Default::default()
        });

        for _ in 0..16 {
            let r = gc.allocate_slot();
            let white = gc.current_white;
            let slot = gc.slot_mut(r).unwrap();
            slot.payload = Payload::new(ObjectKind::Object);
            slot.color = white;
        }
        assert!(gc.free_heaps.is_none());

        gc.add_page();
        assert!(gc.free_heaps.is_some());
        assert_eq!(gc.page_count(), 2);
    }

    #[test]
    fn test_dead_handle_detection() {
        let mut gc = Gc::new(GcConfig::default());
        let r = gc.allocate_slot();

        // Still a free slot: dead.
        assert!(gc.is_object_dead(r));

        let white = gc.current_white;
        let slot = gc.slot_mut(r).unwrap();
        slot.payload = Payload::new(ObjectKind::Object);
        slot.color = white;
        assert!(!gc.is_object_dead(r));

        // Handle to a page that was never created.
        assert!(gc.is_object_dead(ObjRef::new(99, 0)));
    }

    #[test]
    fn test_white_flip() {
        let mut gc = Gc::new(GcConfig::default());
        assert_eq!(gc.current_white, Color::WhiteA);
        assert_eq!(gc.condemned_white(), Color::WhiteB);
        gc.flip_white();
        assert_eq!(gc.current_white, Color::WhiteB);
        assert_eq!(gc.condemned_white(), Color::WhiteA);
    }
}
