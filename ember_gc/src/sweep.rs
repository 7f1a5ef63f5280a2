//! Incremental sweeping and object finalization.
//!
//! Sweeping walks the page list with a resume cursor, reclaiming condemned
//! white slots page by page. A page whose every slot is dead is unlinked
//! and released outright. In a minor cycle, pages that end the sweep full
//! of survivors are flagged old and skipped by subsequent minor sweeps;
//! outside generational mode, survivors are repainted the current white so
//! the next cycle condemns them afresh.

use smallvec::SmallVec;

use crate::context::{Context, ContextHandle};
use crate::heap::Gc;
use crate::object::{EnvBacking, Payload};
use crate::{Color, GcState};
use ember_core::ObjRef;

impl Gc {
    /// Enter the SWEEP phase: position the cursor at the head of the page
    /// list and capture the post-mark live count.
    pub(crate) fn prepare_sweep(&mut self) {
        self.state = GcState::Sweep;
        self.sweep_cursor = self.heaps;
        self.live_after_mark = self.live;
    }

    /// Sweep pages until at least `limit` slots have been examined or the
    /// page list is exhausted. Returns the number of slots examined; zero
    /// means the sweep is complete.
    pub(crate) fn incremental_sweep_phase(&mut self, limit: usize) -> usize {
        let page_cap = self.config.page_capacity;
        let condemned = self.condemned_white();
        let minor = self.is_minor();
        let generational = self.generational;
        let current_white = self.current_white;

        let mut cursor = self.sweep_cursor;
        // Predecessor of the resume page, needed to unlink released pages.
        let mut prev: Option<u32> = None;
        if cursor.is_some() {
            let mut walk = self.heaps;
            while walk.is_some() && walk != cursor {
                prev = walk;
                walk = walk.and_then(|i| self.page(i)).and_then(|p| p.next);
            }
        }

        let mut tried = 0usize;
        while tried < limit {
            let idx = match cursor {
                Some(i) => i,
                None => break,
            };
            let mut dead: SmallVec<[u32; 64]> = SmallVec::new();
            let (next, mut dead_page) = {
                let page = match self.page_mut(idx) {
                    Some(p) => p,
                    None => break,
                };
                let next = page.next;
                let mut dead_page = true;
                if minor && page.old {
                    dead_page = false;
                } else {
                    for (i, slot) in page.slots.iter_mut().enumerate() {
                        if slot.payload.is_free() {
                            continue;
                        }
                        if slot.color == condemned {
                            dead.push(i as u32);
                        } else {
                            if !generational && slot.color != Color::Red {
                                slot.color = current_white;
                            }
                            dead_page = false;
                        }
                    }
                }
                (next, dead_page)
            };

            let freed = dead.len();
            for i in &dead {
                self.obj_free(ObjRef::new(idx, *i));
                if let Some(page) = self.page_mut(idx) {
                    page.push_free(*i);
                }
            }
            self.live -= freed;
            self.live_after_mark = self.live_after_mark.saturating_sub(freed);
            self.stats.objects_freed += freed as u64;

            // A page left entirely dead is released, unless every one of
            // its slots was freed just now (such a page was fully live a
            // cycle ago and is likely to be refilled).
            if freed == page_cap {
                dead_page = false;
            }
            if dead_page {
                match prev {
                    None => self.heaps = next,
                    Some(p) => {
                        if let Some(pp) = self.page_mut(p) {
                            pp.next = next;
                        }
                    }
                }
                self.release_page(idx);
            } else {
                let has_free = self.page(idx).map_or(false, |p| p.has_free());
                if let Some(page) = self.page_mut(idx) {
                    page.old = minor && !has_free;
                }
                prev = Some(idx);
            }
            cursor = next;
            tried += page_cap;
        }

        self.sweep_cursor = cursor;
        self.rebuild_free_list();
        tried
    }

    /// Finalize one object: the payload is replaced with a free slot and
    /// dropped. Foreign release hooks run on drop; a dying fiber first
    /// unshares any environments still aliasing its operand stack.
    pub(crate) fn obj_free(&mut self, r: ObjRef) {
        let payload = match self.take_payload(r) {
            Some(p) => p,
            None => return,
        };
        if let Payload::Fiber(data) = payload {
            if let Some(ctx) = data.context {
                self.unshare_stack_envs(r, &ctx);
            }
        }
    }

    /// Copy stack-backed environment captures out of a dying fiber's
    /// context into owned storage, so closures that outlive the fiber keep
    /// their captured values.
    fn unshare_stack_envs(&mut self, fiber: ObjRef, ctx: &Context) {
        for frame in &ctx.frames {
            let env = match frame.env {
                Some(e) => e,
                None => continue,
            };
            let slot = match self.slot_mut(env) {
                Some(s) => s,
                None => continue,
            };
            if let Payload::Env(data) = &mut slot.payload {
                let (base, len) = match &data.backing {
                    EnvBacking::Stack {
                        ctx: ContextHandle::Fiber(owner),
                        base,
                        len,
                    } if *owner == fiber => (*base, *len),
                    _ => continue,
                };
                let end = (base + len).min(ctx.stack.len());
                let copied = ctx.stack.get(base..end).map(<[_]>::to_vec).unwrap_or_default();
                data.backing = EnvBacking::Owned(copied);
            }
        }
    }

    /// Rebuild the pages-with-free-slots list from the page list. Run after
    /// every sweep increment, which both links newly opened pages and drops
    /// released ones.
    pub(crate) fn rebuild_free_list(&mut self) {
        let order = self.page_indices();
        let mut head: Option<u32> = None;
        for idx in order.into_iter().rev() {
            let has_free = self.page(idx).map_or(false, |p| p.has_free());
            if let Some(page) = self.page_mut(idx) {
                page.free_next = if has_free { head } else { None };
            }
            if has_free {
                head = Some(idx);
            }
        }
        self.free_heaps = head;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::object::ObjectKind;
    use crate::runtime::Runtime;
    use ember_core::Value;
    use std::any::Any;

    #[test]
    fn test_sweep_reclaims_condemned_objects() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let keep = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        let doomed = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.arena_restore(0);
        rt.register_root(keep);

        let live_before = rt.live_count();
        rt.collect();
        assert!(rt.live_count() < live_before);
        assert!(!rt.is_object_dead(keep));
        assert!(rt.is_object_dead(doomed));
    }

    #[test]
    fn test_fully_dead_page_is_released() {
        let mut rt = Runtime::new(GcConfig {
            page_capacity: 64,
            generational: false,
            ..Default::default()
        });
        let class = rt.object_class();

        for _ in 0..512 {
            let save = rt.arena_save();
            rt.allocate(ObjectKind::Object, Some(class)).unwrap();
            rt.arena_restore(save);
        }
        let pages_before = rt.page_count();
        assert!(pages_before > 2);

        // Two cycles: the first condemns and frees, the second releases
        // pages that stayed empty.
        rt.collect();
        rt.collect();
        assert!(rt.page_count() < pages_before);
        assert!(rt.gc_stats().pages_released > 0);
    }

    #[test]
    fn test_foreign_release_hook_runs_on_sweep() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static RELEASED: AtomicBool = AtomicBool::new(false);
        fn release(_: Box<dyn Any>) {
            RELEASED.store(true, Ordering::SeqCst);
        }

        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let f = rt.allocate(ObjectKind::Foreign, Some(class)).unwrap();
        if let Some(slot) = rt.gc.slot_mut(f) {
            if let Payload::Foreign(d) = &mut slot.payload {
                d.data = Some(Box::new(7u32));
                d.release = Some(release);
            }
        }
        rt.arena_restore(0);
        rt.collect();
        assert!(rt.is_object_dead(f));
        assert!(RELEASED.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dying_fiber_unshares_captured_env() {
        let mut rt = Runtime::new(GcConfig::default());
        let fiber = rt.alloc_fiber().unwrap();
        {
            let ctx = rt.fiber_context_mut(fiber).unwrap();
            ctx.push_frame(2);
            ctx.set_register(0, Value::Int(11));
            ctx.set_register(1, Value::Int(22));
        }
        let env = rt
            .capture_stack_env(ContextHandle::Fiber(fiber), 0, 2)
            .unwrap();
        {
            let ctx = rt.fiber_context_mut(fiber).unwrap();
            ctx.frames.last_mut().unwrap().env = Some(env);
        }
        rt.register_root(env);
        rt.arena_restore(0);

        rt.collect();
        assert!(rt.is_object_dead(fiber));
        assert!(!rt.is_object_dead(env));
        assert_eq!(rt.env_value(env, 0), Value::Int(11));
        assert_eq!(rt.env_value(env, 1), Value::Int(22));
    }
}
