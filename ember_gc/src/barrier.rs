//! Write barriers.
//!
//! Incremental and generational collection both depend on the mutator
//! reporting stores of references into heap objects. Without a barrier, a
//! black (fully scanned, or old-generation) object could acquire a
//! reference to a white object that the marker will never revisit, and the
//! sweeper would reclaim a reachable object.
//!
//! Two barriers are provided, mirroring the two costs of repair:
//!
//! - the **field barrier** re-grays the *stored value*: right after a
//!   single-field store, pay once for that field;
//! - the **object barrier** re-grays the *owner* onto the atomic worklist:
//!   right before bulk mutation of a container, pay a full rescan of the
//!   object at the final mark step.
//!
//! Both are no-ops unless the owner is black, so barrier calls are cheap
//! on the fast path.

use crate::heap::Gc;
use crate::runtime::Runtime;
use crate::{Color, GcState};
use ember_core::{ObjRef, Value};

impl Gc {
    /// Field write barrier: call after storing `value` into a field of
    /// `owner`.
    ///
    /// During marking (and always in generational mode) a white value
    /// stored into a black owner is grayed so the marker revisits it.
    /// During sweeping the owner is instead repainted the current white:
    /// the cycle's fate is already decided, and repainting keeps the owner
    /// from being treated as scanned by the next cycle's barriers.
    pub(crate) fn field_write_barrier(&mut self, owner: ObjRef, value: Value) {
        let child = match value {
            Value::Obj(r) => r,
            _ => return,
        };
        match self.slot(owner) {
            Some(slot) if slot.color == Color::Black => {}
            _ => return,
        }
        match self.slot(child) {
            Some(slot) if slot.color.is_white() && !slot.payload.is_free() => {}
            _ => return,
        }

        if self.generational || self.state == GcState::Mark {
            self.add_gray_list(child);
        } else {
            debug_assert_eq!(self.state, GcState::Sweep);
            let white = self.current_white;
            if let Some(slot) = self.slot_mut(owner) {
                slot.color = white;
            }
        }
    }

    /// Object write barrier: call before bulk-mutating `owner`.
    ///
    /// A black owner is re-grayed onto the atomic worklist, which only the
    /// final mark step drains; the owner is rescanned exactly once however
    /// many stores follow.
    pub(crate) fn write_barrier(&mut self, owner: ObjRef) {
        match self.slot(owner) {
            Some(slot) if slot.color == Color::Black => {}
            _ => return,
        }
        let head = self.atomic_gray_head;
        if let Some(slot) = self.slot_mut(owner) {
            slot.color = Color::Gray;
            slot.gc_next = head;
            self.atomic_gray_head = Some(owner);
        }
    }
}

impl Runtime {
    /// Field write barrier; see [`Gc::field_write_barrier`]. Mutation
    /// helpers on [`Runtime`] call this themselves; embedders storing
    /// references through direct payload access must call it by hand.
    #[inline]
    pub fn field_write_barrier(&mut self, owner: ObjRef, value: Value) {
        self.gc.field_write_barrier(owner, value);
    }

    /// Object write barrier; see [`Gc::write_barrier`].
    #[inline]
    pub fn write_barrier(&mut self, owner: ObjRef) {
        self.gc.write_barrier(owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::object::{ObjectKind, Payload};

    fn black_owner_and_white_child(rt: &mut Runtime) -> (ObjRef, ObjRef) {
        let class = rt.object_class();
        let owner = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        rt.register_root(owner);
        rt.collect();
        assert_eq!(rt.gc.slot(owner).unwrap().color, Color::Black);

        let child = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        assert!(rt.gc.slot(child).unwrap().color.is_white());
        (owner, child)
    }

    #[test]
    fn test_field_barrier_grays_stored_value() {
        let mut rt = Runtime::new(GcConfig::default());
        let (owner, child) = black_owner_and_white_child(&mut rt);

        rt.field_write_barrier(owner, Value::Obj(child));
        assert_eq!(rt.gc.slot(child).unwrap().color, Color::Gray);
        assert_eq!(rt.gc.gray_head, Some(child));
    }

    #[test]
    fn test_object_barrier_regrays_owner_on_atomic_list() {
        let mut rt = Runtime::new(GcConfig::default());
        let (owner, _) = black_owner_and_white_child(&mut rt);

        rt.write_barrier(owner);
        assert_eq!(rt.gc.slot(owner).unwrap().color, Color::Gray);
        assert_eq!(rt.gc.atomic_gray_head, Some(owner));
    }

    #[test]
    fn test_barrier_noop_for_non_black_owner() {
        let mut rt = Runtime::new(GcConfig::default());
        let class = rt.object_class();
        let owner = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
        let child = rt.allocate(ObjectKind::Object, Some(class)).unwrap();

        rt.field_write_barrier(owner, Value::Obj(child));
        assert!(rt.gc.slot(child).unwrap().color.is_white());
        rt.write_barrier(owner);
        assert!(rt.gc.slot(owner).unwrap().color.is_white());
    }

    #[test]
    fn test_missing_barrier_loses_hidden_reference() {
        // Store a reference into a black owner behind the collector's back:
        // the value is unreachable to the marker and gets swept.
        let mut rt = Runtime::new(GcConfig::default());
        let (owner, child) = black_owner_and_white_child(&mut rt);
        rt.arena_restore(0);

        let name = rt.intern("hidden");
        if let Some(slot) = rt.gc.slot_mut(owner) {
            if let Payload::Object(d) = &mut slot.payload {
                d.ivars.insert(name, Value::Obj(child));
            }
        }
        // No barrier call. A minor cycle never rescans the black owner.
        rt.collect_incremental();
        assert!(rt.is_object_dead(child));
    }

    #[test]
    fn test_barrier_preserves_hidden_reference() {
        let mut rt = Runtime::new(GcConfig::default());
        let (owner, child) = black_owner_and_white_child(&mut rt);
        rt.arena_restore(0);

        let name = rt.intern("kept");
        if let Some(slot) = rt.gc.slot_mut(owner) {
            if let Payload::Object(d) = &mut slot.payload {
                d.ivars.insert(name, Value::Obj(child));
            }
        }
        rt.field_write_barrier(owner, Value::Obj(child));
        rt.collect_incremental();
        assert!(!rt.is_object_dead(child));
    }
}
