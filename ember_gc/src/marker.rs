//! Tri-color marking.
//!
//! Marking is split into cheap primitives on [`Gc`] (painting an object gray
//! and queueing it) and the heavier scanning driver on [`Runtime`], which
//! needs access to execution contexts to trace operand stacks.
//!
//! The gray worklist is intrusive: `Slot::gc_next` threads gray objects
//! together, so queueing never allocates. A second worklist, the atomic gray
//! list, collects objects re-grayed by the object write barrier; it is only
//! drained by the final (uncapped) mark step, which keeps barrier-heavy
//! mutators from starving incremental progress.

use smallvec::SmallVec;

use crate::context::ContextHandle;
use crate::heap::Gc;
use crate::object::{EnvBacking, ObjectKind, Payload};
use crate::runtime::Runtime;
use crate::Color;
use ember_core::{ObjRef, Value};

impl Gc {
    /// Paint an object gray and push it onto the primary gray worklist.
    pub(crate) fn add_gray_list(&mut self, r: ObjRef) {
        let head = self.gray_head;
        match self.slot_mut(r) {
            Some(slot) => {
                slot.color = Color::Gray;
                slot.gc_next = head;
            }
            None => return,
        }
        self.gray_head = Some(r);
    }

    /// Mark an object: white objects are queued gray, anything else (black,
    /// gray, red, free) is left untouched.
    pub(crate) fn mark(&mut self, r: ObjRef) {
        match self.slot(r) {
            Some(slot) if slot.color.is_white() && !slot.payload.is_free() => {}
            _ => return,
        }
        self.add_gray_list(r);
    }

    /// Mark a value if it is a heap reference.
    #[inline]
    pub(crate) fn mark_value(&mut self, v: Value) {
        if let Value::Obj(r) = v {
            self.mark(r);
        }
    }
}

impl Runtime {
    /// Resolve a context handle to the context it names.
    pub(crate) fn context_ref(&self, h: ContextHandle) -> Option<&crate::context::Context> {
        match h {
            ContextHandle::Root => Some(&self.root_context),
            ContextHandle::Fiber(f) => match &self.gc.slot(f)?.payload {
                Payload::Fiber(d) => d.context.as_deref(),
                _ => None,
            },
        }
    }

    /// Collect every outgoing reference of an object into `out`.
    ///
    /// This is the single place that knows which payload fields are
    /// references; the marker and the heap verifier both dispatch through
    /// it. Fibers contribute their context's live stack and frames but not
    /// the resumer chain (the marker follows that itself).
    pub(crate) fn gather_children(&self, r: ObjRef, out: &mut SmallVec<[Value; 16]>) {
        let slot = match self.gc.slot(r) {
            Some(s) => s,
            None => return,
        };
        if let Some(c) = slot.class {
            out.push(Value::Obj(c));
        }
        match &slot.payload {
            Payload::Free { .. } => {}
            Payload::Object(d) => out.extend(d.ivars.values().copied()),
            Payload::Class(d) | Payload::Module(d) | Payload::SClass(d) => {
                if let Some(sup) = d.superclass {
                    out.push(Value::Obj(sup));
                }
                out.extend(d.methods.values().copied());
                out.extend(d.ivars.values().copied());
            }
            Payload::Array(d) => out.extend_from_slice(d.backing.elements()),
            Payload::Hash(d) => {
                out.extend(d.ivars.values().copied());
                for (k, v) in &d.entries {
                    out.push(*k);
                    out.push(*v);
                }
            }
            // Strings, backtraces and big integers carry no references:
            // their buffers are owned or reference-counted.
            Payload::Str(_) | Payload::Backtrace(_) | Payload::BigInt(_) => {}
            Payload::Range(d) => {
                out.push(d.begin);
                out.push(d.end);
            }
            Payload::Foreign(d) => out.extend(d.ivars.values().copied()),
            Payload::Proc(d) => {
                if let Some(u) = d.upper {
                    out.push(Value::Obj(u));
                }
                if let Some(e) = d.env {
                    out.push(Value::Obj(e));
                }
            }
            Payload::Env(d) => match &d.backing {
                EnvBacking::Owned(v) => out.extend_from_slice(v),
                EnvBacking::Stack { ctx, base, len } => {
                    if let Some(c) = self.context_ref(*ctx) {
                        let end = (base + len).min(c.stack.len());
                        if *base < end {
                            out.extend_from_slice(&c.stack[*base..end]);
                        }
                    }
                }
            },
            Payload::Fiber(d) => {
                if let Some(c) = &d.context {
                    let e = c.live_extent().min(c.stack.len());
                    out.extend_from_slice(&c.stack[..e]);
                    for frame in &c.frames {
                        if let Some(p) = frame.proc_obj {
                            out.push(Value::Obj(p));
                        }
                        if let Some(t) = frame.target_class {
                            out.push(Value::Obj(t));
                        }
                        if let Some(env) = frame.env {
                            out.push(Value::Obj(env));
                        }
                    }
                    if let Some(fb) = c.fiber {
                        out.push(Value::Obj(fb));
                    }
                }
            }
            Payload::Exception(d) => {
                out.extend(d.ivars.values().copied());
                if let Some(m) = d.message {
                    out.push(Value::Obj(m));
                }
                if let Some(b) = d.backtrace {
                    out.push(Value::Obj(b));
                }
            }
            Payload::Struct(d) => out.extend_from_slice(&d.fields),
        }
    }

    /// Scan one gray object: paint it black and mark all of its children.
    /// Returns the amount of marking work performed, which the incremental
    /// budget is charged with.
    pub(crate) fn mark_children(&mut self, r: ObjRef) -> usize {
        let kind = match self.gc.slot_mut(r) {
            Some(slot) => {
                slot.color = Color::Black;
                slot.gc_next = None;
                slot.kind()
            }
            None => return 0,
        };

        // Fibers are scanned through the context walker, which also nils
        // the dead region of the operand stack and follows the resumer
        // chain.
        if kind == ObjectKind::Fiber {
            if let Some(class) = self.gc.slot(r).and_then(|s| s.class) {
                self.gc.mark(class);
            }
            return self.mark_context(ContextHandle::Fiber(r)) + 1;
        }

        let mut children: SmallVec<[Value; 16]> = SmallVec::new();
        self.gather_children(r, &mut children);
        for v in &children {
            self.gc.mark_value(*v);
        }
        children.len() + 1
    }

    /// Drain the primary gray worklist until `limit` units of work have
    /// been performed or the list is empty.
    pub(crate) fn incremental_marking_phase(&mut self, limit: usize) -> usize {
        let mut tried = 0;
        while let Some(r) = self.gc.gray_head {
            self.gc.gray_head = self.gc.slot(r).and_then(|s| s.gc_next);
            tried += self.mark_children(r);
            if tried >= limit {
                break;
            }
        }
        tried
    }

    /// The terminal, uncapped mark step.
    ///
    /// Roots that may have changed since the initial scan are re-marked,
    /// the pre-allocated error objects are scavenged, and both worklists
    /// are drained to empty. After this returns, every live object is
    /// black and sweeping may begin.
    pub(crate) fn final_marking_phase(&mut self) {
        let arena: SmallVec<[ObjRef; 32]> = self.gc.arena.iter().copied().collect();
        for r in arena {
            self.gc.mark(r);
        }
        let globals: SmallVec<[Value; 16]> = self.globals.values().copied().collect();
        for v in globals {
            self.gc.mark_value(v);
        }
        let roots = self.gc.roots.clone();
        for r in roots {
            self.gc.mark(r);
        }
        self.mark_context(self.current);
        if self.current != ContextHandle::Root {
            self.mark_context(ContextHandle::Root);
        }
        if let Some(e) = self.exc {
            self.gc.mark(e);
        }
        self.scavenge_error_object(self.nomem_err);
        self.scavenge_error_object(self.arena_err);

        self.incremental_marking_phase(usize::MAX);
        debug_assert!(self.gc.gray_head.is_none());
        self.gc.gray_head = self.gc.atomic_gray_head.take();
        self.incremental_marking_phase(usize::MAX);
        debug_assert!(self.gc.gray_head.is_none());
    }

    /// Keep a pre-allocated error object alive across the cycle.
    ///
    /// If the error is still white here, nothing references it, and the
    /// state captured at its last raise is dropped so a dead backtrace or
    /// instance variable graph is not retained forever. A referenced error
    /// (rooted, pending, or stored somewhere) keeps its state untouched.
    /// The message is never dropped; it is part of the pre-allocation.
    fn scavenge_error_object(&mut self, err: ObjRef) {
        match self.gc.slot(err) {
            Some(slot) if slot.color.is_white() => {}
            _ => return,
        }
        if let Some(slot) = self.gc.slot_mut(err) {
            if let Payload::Exception(d) = &mut slot.payload {
                d.ivars.clear();
                d.backtrace = None;
            }
        }
        self.gc.mark(err);
    }

    /// Check the tri-color invariant over the whole heap: no black object
    /// may reference a condemned white object. Returns the number of
    /// violations found (each is also logged).
    pub fn verify_heap(&self) -> usize {
        let condemned = self.gc.condemned_white();
        let mut violations = 0;
        let mut children: SmallVec<[Value; 16]> = SmallVec::new();
        for r in self.gc.live_handles() {
            match self.gc.slot(r) {
                Some(slot) if slot.color == Color::Black => {}
                _ => continue,
            }
            children.clear();
            self.gather_children(r, &mut children);
            for v in &children {
                let child = match v {
                    Value::Obj(c) => *c,
                    _ => continue,
                };
                if let Some(cs) = self.gc.slot(child) {
                    if cs.color == condemned && !cs.payload.is_free() {
                        log::error!(
                            "tri-color violation: black {:?} references condemned {:?}",
                            r,
                            child
                        );
                        violations += 1;
                    }
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::GcState;

    #[test]
    fn test_mark_grays_then_drain_blackens() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();

        rt.gc.mark(obj);
        assert_eq!(rt.gc.slot(obj).unwrap().color, Color::Gray);
        assert_eq!(rt.gc.gray_head, Some(obj));

        rt.incremental_marking_phase(usize::MAX);
        assert_eq!(rt.gc.slot(obj).unwrap().color, Color::Black);
        assert!(rt.gc.gray_head.is_none());
    }

    #[test]
    fn test_marking_reaches_ivar_children() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let parent = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        let child = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        let name = rt.intern("child");
        rt.set_ivar(parent, name, Value::Obj(child)).unwrap();

        rt.gc.mark(parent);
        rt.incremental_marking_phase(usize::MAX);
        assert_eq!(rt.gc.slot(child).unwrap().color, Color::Black);
    }

    #[test]
    fn test_mark_skips_black_and_red() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();

        rt.gc.slot_mut(obj).unwrap().color = Color::Red;
        rt.gc.mark(obj);
        assert!(rt.gc.gray_head.is_none());
        assert_eq!(rt.gc.slot(obj).unwrap().color, Color::Red);
    }

    #[test]
    fn test_referenced_error_keeps_state_across_collection() {
        let mut rt = Runtime::new(GcConfig::default());
        let err = rt.nomem_error();
        rt.register_root(err);
        let name = rt.intern("code");
        rt.set_ivar(err, name, Value::Int(5)).unwrap();

        rt.collect();
        assert_eq!(rt.ivar(err, name), Value::Int(5));

        // Unreferenced again: the captured state is scavenged, the object
        // itself stays alive.
        rt.unregister_root(err);
        rt.collect();
        assert_eq!(rt.ivar(err, name), Value::Nil);
        assert!(!rt.is_object_dead(err));
    }

    #[test]
    fn test_verify_clean_after_full_collection() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.register_root(obj);
        rt.collect();
        assert_eq!(rt.gc.state(), GcState::Root);
        assert_eq!(rt.verify_heap(), 0);
    }
}
