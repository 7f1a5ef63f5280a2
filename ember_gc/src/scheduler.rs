//! Cycle scheduling.
//!
//! The collector advances through ROOT -> MARK -> SWEEP -> ROOT in bounded
//! increments. Allocation pressure drives it: once the live count passes
//! the threshold, the allocator requests an incremental collection, which
//! performs one budgeted step (or, in generational minor mode, a whole
//! young-generation cycle, which is cheap because old pages are skipped).
//!
//! Threshold arithmetic follows the post-mark live count: the next cycle
//! begins after the heap grows by `interval_ratio` percent, and in
//! generational mode a major collection fires once the surviving set grows
//! past the old-generation ceiling.

use crate::config::{MAJOR_GROWTH_RATIO, MAJOR_TOO_MANY, STEP_UNIT};
use crate::object::ObjectKind;
use crate::runtime::Runtime;
use crate::GcState;
use ember_core::{ObjRef, VmResult};

impl Runtime {
    /// Advance the collector by one phase increment with the given work
    /// budget. Returns the amount of work performed.
    pub(crate) fn incremental_gc(&mut self, limit: usize) -> usize {
        match self.gc.state {
            GcState::Root => {
                self.root_scan_phase();
                self.gc.flip_white();
                self.gc.state = GcState::Mark;
                0
            }
            GcState::Mark => {
                if self.gc.gray_head.is_some() {
                    self.incremental_marking_phase(limit)
                } else {
                    self.final_marking_phase();
                    self.gc.prepare_sweep();
                    0
                }
            }
            GcState::Sweep => {
                let tried = self.gc.incremental_sweep_phase(limit);
                if tried == 0 {
                    self.gc.state = GcState::Root;
                    if self.gc.is_minor() {
                        self.gc.stats.minor_cycles += 1;
                    } else {
                        self.gc.stats.major_cycles += 1;
                    }
                }
                tried
            }
        }
    }

    /// Run the collector until the cycle returns to ROOT. Always advances
    /// at least once, so a collector already at ROOT runs one full cycle.
    pub(crate) fn incremental_gc_until_root(&mut self) {
        loop {
            self.incremental_gc(usize::MAX);
            if self.gc.state == GcState::Root {
                break;
            }
        }
    }

    /// One allocation-driven step: perform a bounded amount of work and
    /// re-arm the threshold.
    pub(crate) fn incremental_gc_step(&mut self) {
        let limit = (STEP_UNIT / 100) * self.gc.step_ratio;
        let mut result = 0;
        while result < limit {
            result += self.incremental_gc(limit);
            if self.gc.state == GcState::Root {
                break;
            }
        }
        self.gc.threshold = self.gc.live + STEP_UNIT;
        self.gc.stats.incremental_steps += 1;
    }

    /// Incremental collection entry point, called by the allocator when
    /// the live count passes the threshold.
    ///
    /// In generational minor mode this runs a complete young-generation
    /// cycle; otherwise it performs one budgeted step. When a cycle
    /// completes, thresholds are recomputed and generational policy is
    /// applied: a finished major resets the old-generation ceiling (or
    /// forces a full collection if the ceiling would be absurd), and a
    /// minor whose survivors outgrew the ceiling schedules a major by
    /// erasing the old generation.
    pub fn collect_incremental(&mut self) {
        if self.gc.disabled || self.gc.iterating {
            return;
        }
        log::trace!(
            "incremental GC: state={:?} live={} threshold={}",
            self.gc.state(),
            self.gc.live,
            self.gc.threshold
        );

        if self.gc.is_minor() {
            self.incremental_gc_until_root();
        } else {
            self.incremental_gc_step();
        }

        if self.gc.state == GcState::Root {
            debug_assert!(self.gc.live >= self.gc.live_after_mark);
            self.gc.threshold = (self.gc.live_after_mark / 100) * self.gc.interval_ratio;
            if self.gc.threshold < STEP_UNIT {
                self.gc.threshold = STEP_UNIT;
            }

            if self.gc.is_major() {
                let ceiling = (self.gc.live_after_mark / 100) * MAJOR_GROWTH_RATIO;
                self.gc.full = false;
                if ceiling < MAJOR_TOO_MANY {
                    self.gc.oldgen_threshold = ceiling;
                } else {
                    // Too much was allocated while the major cycle ran;
                    // collect again now rather than raising the ceiling.
                    self.collect();
                }
            } else if self.gc.is_minor() && self.gc.live > self.gc.oldgen_threshold {
                self.clear_all_old();
                self.gc.full = true;
            }
        }
    }

    /// Run a full stop-the-world collection.
    ///
    /// Any in-flight cycle is finished first. In generational mode the old
    /// generation is erased, so the cycle traces and condemns the entire
    /// heap, and the old-generation ceiling is re-established from the
    /// survivors.
    pub fn collect(&mut self) {
        if self.gc.disabled || self.gc.iterating {
            return;
        }
        log::debug!("full GC: {} live before", self.gc.live);

        if self.gc.generational {
            self.clear_all_old();
            self.gc.full = true;
        } else if self.gc.state != GcState::Root {
            self.incremental_gc_until_root();
        }
        self.incremental_gc_until_root();

        self.gc.threshold = (self.gc.live_after_mark / 100) * self.gc.interval_ratio;
        if self.gc.threshold < STEP_UNIT {
            self.gc.threshold = STEP_UNIT;
        }
        if self.gc.generational {
            self.gc.oldgen_threshold = (self.gc.live_after_mark / 100) * MAJOR_GROWTH_RATIO;
            self.gc.full = false;
        }
        log::debug!("full GC: {} live after", self.gc.live);

        if self.gc.config.verify_heap {
            let violations = self.verify_heap();
            debug_assert_eq!(violations, 0, "tri-color invariant violated after full GC");
        }
    }

    /// Erase the old generation: finish any in-flight major cycle, then run
    /// one complete non-generational cycle so every survivor (old objects
    /// included) ends up freshly white.
    pub(crate) fn clear_all_old(&mut self) {
        debug_assert!(self.gc.generational);
        let origin = self.gc.generational;
        if self.gc.is_major() {
            self.incremental_gc_until_root();
        }
        self.gc.generational = false;
        self.gc.prepare_sweep();
        self.incremental_gc_until_root();
        self.gc.generational = origin;
        // Survivors are all white again; stale worklist entries would only
        // resurrect the partition.
        self.gc.gray_head = None;
        self.gc.atomic_gray_head = None;
    }

    /// Switch generational mode on or off.
    ///
    /// Raises a runtime error while the collector is disabled or the heap
    /// is being iterated. Disabling erases the old generation; enabling
    /// finishes the current cycle and establishes a fresh ceiling.
    pub fn set_generational(&mut self, enable: bool) -> VmResult<()> {
        if self.gc.disabled || self.gc.iterating {
            return Err(self.raise_runtime_error("generational mode changed when GC disabled"));
        }
        if self.gc.generational && !enable {
            self.clear_all_old();
            debug_assert_eq!(self.gc.state, GcState::Root);
            self.gc.full = false;
        } else if !self.gc.generational && enable {
            self.incremental_gc_until_root();
            self.gc.oldgen_threshold = (self.gc.live_after_mark / 100) * MAJOR_GROWTH_RATIO;
            self.gc.full = false;
        }
        self.gc.generational = enable;
        Ok(())
    }

    /// Enable or disable collection entirely. Returns the previous enabled
    /// state. While disabled, the heap only grows.
    pub fn set_gc_enabled(&mut self, enabled: bool) -> bool {
        let was_enabled = !self.gc.disabled;
        self.gc.disabled = !enabled;
        was_enabled
    }

    /// Visit every live object.
    ///
    /// A full collection runs first so the callback only sees objects that
    /// survived, then the heap is walked with collection suppressed. The
    /// callback returns `false` to stop early.
    pub fn each_live_object<F>(&mut self, mut f: F)
    where
        F: FnMut(ObjRef, ObjectKind) -> bool,
    {
        let was_iterating = self.gc.iterating;
        self.collect();
        self.gc.iterating = true;
        for r in self.gc.live_handles() {
            let kind = match self.gc.kind_of(r) {
                Some(k) if k != ObjectKind::Free => k,
                _ => continue,
            };
            if !f(r, kind) {
                break;
            }
        }
        self.gc.iterating = was_iterating;
    }
}
