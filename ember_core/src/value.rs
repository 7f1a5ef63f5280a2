//! Tagged value representation.
//!
//! A `Value` is either an immediate (nil, booleans, numbers, symbols) or a
//! handle to a heap-allocated object. Immediates are never touched by the
//! collector; only `Value::Obj` participates in tracing.

use crate::symbol::Symbol;

/// A handle to a heap-allocated object.
///
/// Handles are indices into the collector's page table, not raw pointers:
/// `page` selects a heap page and `slot` selects an object slot inside it.
/// A handle stays bit-identical for the lifetime of the object (objects are
/// never moved), but it does **not** keep the object alive — use the
/// protection arena or the root table for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    page: u32,
    slot: u32,
}

impl ObjRef {
    /// Create a handle from a page index and a slot index.
    #[inline]
    pub const fn new(page: u32, slot: u32) -> Self {
        Self { page, slot }
    }

    /// Page index of this handle.
    #[inline]
    pub const fn page(self) -> u32 {
        self.page
    }

    /// Slot index within the page.
    #[inline]
    pub const fn slot(self) -> u32 {
        self.slot
    }
}

/// A dynamically typed runtime value.
///
/// Everything except [`Value::Obj`] is an immediate: it lives entirely in the
/// `Value` itself and is invisible to the garbage collector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// The nil value.
    Nil,
    /// Boolean false.
    False,
    /// Boolean true.
    True,
    /// A signed integer.
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// An interned symbol.
    Symbol(Symbol),
    /// A reference to a heap object.
    Obj(ObjRef),
}

impl Value {
    /// The nil value.
    #[inline]
    pub const fn nil() -> Self {
        Value::Nil
    }

    /// A boolean value.
    #[inline]
    pub const fn bool(b: bool) -> Self {
        if b {
            Value::True
        } else {
            Value::False
        }
    }

    /// True if the value is an immediate (not heap-allocated).
    #[inline]
    pub const fn is_immediate(self) -> bool {
        !matches!(self, Value::Obj(_))
    }

    /// True if the value is nil.
    #[inline]
    pub const fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The object handle, if this value is heap-allocated.
    #[inline]
    pub const fn as_obj(self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(r),
            _ => None,
        }
    }

    /// Ruby-style truthiness: everything except nil and false is true.
    #[inline]
    pub const fn is_truthy(self) -> bool {
        !matches!(self, Value::Nil | Value::False)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediates() {
        assert!(Value::Nil.is_immediate());
        assert!(Value::Int(3).is_immediate());
        assert!(Value::Float(1.5).is_immediate());
        assert!(!Value::Obj(ObjRef::new(0, 1)).is_immediate());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::False.is_truthy());
        assert!(Value::True.is_truthy());
        assert!(Value::Int(0).is_truthy());
    }

    #[test]
    fn test_obj_ref_roundtrip() {
        let r = ObjRef::new(3, 917);
        assert_eq!(r.page(), 3);
        assert_eq!(r.slot(), 917);
        assert_eq!(Value::Obj(r).as_obj(), Some(r));
        assert_eq!(Value::Nil.as_obj(), None);
    }
}
