//! Root management and root scanning.
//!
//! Two pinning mechanisms keep objects alive independently of the object
//! graph:
//!
//! - the **protection arena**, a bounded stack every allocation implicitly
//!   pushes onto; native call sites bracket allocating work with
//!   [`Runtime::arena_save`] / [`Runtime::arena_restore`], and overflow
//!   raises the pre-allocated arena error;
//! - the **root table**, an unbounded register/unregister set for
//!   long-lived embedder references.
//!
//! Root scanning also walks the execution contexts: the current context,
//! the runtime's primary context, and (transitively, through fiber objects)
//! every suspended fiber context reachable from them.

use smallvec::SmallVec;

use crate::context::{ContextHandle, FiberStatus};
use crate::object::Payload;
use crate::runtime::Runtime;
use ember_core::{ObjRef, Raised, Value, VmResult};

impl Runtime {
    // =========================================================================
    // Protection arena
    // =========================================================================

    /// Push an object onto the protection arena.
    ///
    /// Every allocation already does this for the new object; explicit calls
    /// are for objects re-derived from untracked storage. On overflow the
    /// arena is truncated to leave working room and the pre-allocated arena
    /// error is raised.
    pub fn protect(&mut self, r: ObjRef) -> VmResult<()> {
        if self.gc.arena.len() >= self.gc.config.arena_capacity {
            let keep = self.gc.config.arena_capacity - 4;
            self.gc.arena.truncate(keep);
            self.exc = Some(self.arena_err);
            return Err(Raised {
                exception: self.arena_err,
            });
        }
        self.gc.arena.push(r);
        Ok(())
    }

    /// Current arena index, to be restored after allocating work.
    #[inline]
    pub fn arena_save(&self) -> usize {
        self.gc.arena.len()
    }

    /// Restore the arena to a previously saved index, releasing every
    /// object protected since.
    #[inline]
    pub fn arena_restore(&mut self, save: usize) {
        self.gc.arena.truncate(save);
    }

    // =========================================================================
    // Root table
    // =========================================================================

    /// Register a long-lived root. The object stays alive until
    /// unregistered. Duplicate registrations must be balanced by the same
    /// number of unregistrations.
    pub fn register_root(&mut self, r: ObjRef) {
        self.gc.roots.push(r);
    }

    /// Remove one registration of `r` from the root table. Returns false if
    /// it was not registered.
    pub fn unregister_root(&mut self, r: ObjRef) -> bool {
        match self.gc.roots.iter().position(|&x| x == r) {
            Some(i) => {
                self.gc.roots.swap_remove(i);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Root scanning
    // =========================================================================

    /// The ROOT phase: seed the gray worklist from every root.
    ///
    /// A full cycle clears both worklists first; a minor cycle keeps them,
    /// since barrier-grayed survivors from the previous cycle are exactly
    /// the remembered set the young generation must be traced from.
    pub(crate) fn root_scan_phase(&mut self) {
        if !self.gc.is_minor() {
            self.gc.gray_head = None;
            self.gc.atomic_gray_head = None;
        }

        let globals: SmallVec<[Value; 16]> = self.globals.values().copied().collect();
        for v in globals {
            self.gc.mark_value(v);
        }
        let arena: SmallVec<[ObjRef; 32]> = self.gc.arena.iter().copied().collect();
        for r in arena {
            self.gc.mark(r);
        }
        let roots = self.gc.roots.clone();
        for r in roots {
            self.gc.mark(r);
        }
        for r in self.builtin_roots() {
            self.gc.mark(r);
        }
        if let Some(e) = self.exc {
            self.gc.mark(e);
        }

        self.mark_context(self.current);
        if self.current != ContextHandle::Root {
            self.mark_context(ContextHandle::Root);
        }
    }

    /// The objects the runtime itself keeps alive: the builtin class graph
    /// and the toplevel self.
    pub(crate) fn builtin_roots(&self) -> SmallVec<[ObjRef; 16]> {
        let mut roots = SmallVec::new();
        roots.push(self.object_class);
        roots.push(self.class_class);
        roots.push(self.module_class);
        roots.push(self.string_class);
        roots.push(self.array_class);
        roots.push(self.hash_class);
        roots.push(self.range_class);
        roots.push(self.proc_class);
        roots.push(self.fiber_class);
        roots.push(self.exception_class);
        roots.push(self.standard_error_class);
        roots.push(self.runtime_error_class);
        roots.push(self.type_error_class);
        roots.push(self.no_memory_error_class);
        roots.push(self.kernel_module);
        roots.push(self.top_self);
        roots
    }

    /// Mark a chain of execution contexts, following resumer links.
    ///
    /// For each context: the dead region of the operand stack (past the top
    /// frame's register window) is nilled so stale references cannot keep
    /// garbage alive, the live region and every frame's proc, target class
    /// and environment are marked, and the owning fiber is marked so a
    /// running fiber cannot be collected out from under its own context.
    /// Terminated contexts end the walk. Returns the number of values
    /// marked.
    pub(crate) fn mark_context(&mut self, handle: ContextHandle) -> usize {
        let mut marked = 0;
        let mut cursor = Some(handle);
        let mut values: SmallVec<[Value; 32]> = SmallVec::new();

        while let Some(h) = cursor {
            values.clear();
            let prev = {
                let ctx = match h {
                    ContextHandle::Root => Some(&mut self.root_context),
                    ContextHandle::Fiber(f) => match self.gc.slot_mut(f) {
                        Some(slot) => match &mut slot.payload {
                            Payload::Fiber(d) => d.context.as_deref_mut(),
                            _ => None,
                        },
                        None => None,
                    },
                };
                let ctx = match ctx {
                    Some(c) => c,
                    None => break,
                };
                if ctx.status == FiberStatus::Terminated {
                    break;
                }

                let e = ctx.live_extent().min(ctx.stack.len());
                for v in &mut ctx.stack[e..] {
                    *v = Value::Nil;
                }
                values.extend_from_slice(&ctx.stack[..e]);
                for frame in &ctx.frames {
                    if let Some(p) = frame.proc_obj {
                        values.push(Value::Obj(p));
                    }
                    if let Some(t) = frame.target_class {
                        values.push(Value::Obj(t));
                    }
                    if let Some(env) = frame.env {
                        values.push(Value::Obj(env));
                    }
                }
                if let Some(fb) = ctx.fiber {
                    values.push(Value::Obj(fb));
                }
                ctx.prev
            };

            for v in &values {
                self.gc.mark_value(*v);
            }
            marked += values.len();
            cursor = prev;
        }
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::object::ObjectKind;
    use crate::Color;

    #[test]
    fn test_arena_overflow_raises_prealloc_error() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();

        let mut overflowed = None;
        for _ in 0..200 {
            match rt.allocate(ObjectKind::Object, Some(class)) {
                Ok(_) => {}
                Err(e) => {
                    overflowed = Some(e);
                    break;
                }
            }
        }
        let raised = overflowed.expect("arena should overflow");
        assert_eq!(raised.exception, rt.arena_error());
        // Truncated to leave working room below capacity.
        assert!(rt.arena_save() < rt.gc.config.arena_capacity);
    }

    #[test]
    fn test_arena_save_restore() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();

        let save = rt.arena_save();
        for _ in 0..10 {
            rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        }
        assert_eq!(rt.arena_save(), save + 10);
        rt.arena_restore(save);
        assert_eq!(rt.arena_save(), save);
    }

    #[test]
    fn test_unregister_root() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();

        rt.register_root(obj);
        assert!(rt.unregister_root(obj));
        assert!(!rt.unregister_root(obj));
    }

    #[test]
    fn test_mark_context_nils_dead_stack_region() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();

        let ctx = rt.root_context_mut();
        ctx.push_frame(2);
        ctx.stack.push(Value::Obj(obj));
        assert_eq!(ctx.stack.len(), 3);

        rt.mark_context(ContextHandle::Root);
        assert_eq!(rt.root_context_mut().stack[2], Value::Nil);
    }

    #[test]
    fn test_registered_root_is_marked() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.arena_restore(0);
        rt.register_root(obj);

        rt.root_scan_phase();
        rt.incremental_marking_phase(usize::MAX);
        assert_eq!(rt.gc.slot(obj).unwrap().color, Color::Black);
    }
}
