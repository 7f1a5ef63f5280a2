//! Heap object model.
//!
//! Every heap value is one [`Slot`]: a small header (color, owning class,
//! worklist link) plus a [`Payload`] drawn from a closed kind set. Which
//! payload fields are outgoing references is a total function over the kind
//! tag; the marker and sweeper dispatch exhaustively rather than through
//! virtual calls.
//!
//! The original storage trick of reusing one word as either the free-list
//! link, the gray-list link, or live payload is expressed here as explicit
//! variants: `Payload::Free` carries the free-list link, and the header's
//! `gc_next` field is only meaningful while the object is Gray.

use crate::Color;
use ember_core::{ObjRef, Symbol, Value};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::rc::Rc;

use crate::context::{Context, ContextHandle};

/// Kind tag of a heap object. Closed set; `Free` marks an unused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Unused slot on a page free list.
    Free,
    /// Plain object with instance variables.
    Object,
    /// A class.
    Class,
    /// A module.
    Module,
    /// A singleton class.
    SClass,
    /// Growable sequence.
    Array,
    /// Hash table.
    Hash,
    /// Character string.
    Str,
    /// Range with begin/end bounds.
    Range,
    /// Foreign (host-language) data handle.
    Foreign,
    /// Closure / procedure.
    Proc,
    /// Captured lexical environment.
    Env,
    /// Cooperative fiber owning an execution context.
    Fiber,
    /// Exception with message and backtrace.
    Exception,
    /// Captured backtrace.
    Backtrace,
    /// Struct-like fixed aggregate.
    Struct,
    /// Arbitrary-precision integer (numeric extension kind).
    BigInt,
}

/// A shared unit of compiled code referenced by procs and backtraces.
///
/// Chunks are reference-counted rather than traced: they never point back
/// into the object graph.
#[derive(Debug, Default)]
pub struct Chunk {
    /// Display name for diagnostics.
    pub name: String,
    /// Encoded instructions (opaque to the collector).
    pub code: Vec<u32>,
}

/// Instance-variable table payload.
#[derive(Debug, Default)]
pub struct ObjectData {
    /// Named instance variables.
    pub ivars: FxHashMap<Symbol, Value>,
}

/// Class, module, or singleton-class payload.
#[derive(Debug, Default)]
pub struct ClassData {
    /// Class name, if named.
    pub name: Option<Symbol>,
    /// Superclass link.
    pub superclass: Option<ObjRef>,
    /// Kind of instances this class produces (checked on allocation).
    pub instance_kind: Option<ObjectKind>,
    /// Method table: selector -> proc object.
    pub methods: FxHashMap<Symbol, Value>,
    /// Class-level instance variables.
    pub ivars: FxHashMap<Symbol, Value>,
}

/// Element storage for arrays and structs.
///
/// Shared backing is reference-counted separately from the tracer; the
/// count, not the object graph, decides when the buffer itself is dropped.
#[derive(Debug)]
pub enum ArrayBacking {
    /// Exclusively owned elements.
    Owned(Vec<Value>),
    /// Backing shared with other arrays (e.g. slices of a parent).
    Shared(Rc<Vec<Value>>),
}

impl Default for ArrayBacking {
    fn default() -> Self {
        ArrayBacking::Owned(Vec::new())
    }
}

impl ArrayBacking {
    /// Elements, regardless of ownership.
    pub fn elements(&self) -> &[Value] {
        match self {
            ArrayBacking::Owned(v) => v,
            ArrayBacking::Shared(v) => v,
        }
    }

    /// Mutable element access, unsharing a shared backing first
    /// (copy-on-write).
    pub fn make_owned(&mut self) -> &mut Vec<Value> {
        if let ArrayBacking::Shared(rc) = self {
            *self = ArrayBacking::Owned(rc.as_ref().clone());
        }
        match self {
            ArrayBacking::Owned(v) => v,
            ArrayBacking::Shared(_) => unreachable!("backing just unshared"),
        }
    }
}

/// Array payload.
#[derive(Debug, Default)]
pub struct ArrayData {
    /// Element storage.
    pub backing: ArrayBacking,
}

/// Hash payload. Entry order is preserved; the collector only cares that
/// every key and value is enumerable.
#[derive(Debug, Default)]
pub struct HashData {
    /// Key/value entries.
    pub entries: Vec<(Value, Value)>,
    /// Named instance variables.
    pub ivars: FxHashMap<Symbol, Value>,
}

/// Character storage for strings.
#[derive(Debug)]
pub enum StrBacking {
    /// Exclusively owned buffer.
    Owned(String),
    /// Buffer shared with other strings; dropped when the count reaches zero.
    Shared(Rc<str>),
}

impl Default for StrBacking {
    fn default() -> Self {
        StrBacking::Owned(String::new())
    }
}

impl StrBacking {
    /// The string contents.
    pub fn as_str(&self) -> &str {
        match self {
            StrBacking::Owned(s) => s,
            StrBacking::Shared(s) => s,
        }
    }
}

/// String payload.
#[derive(Debug, Default)]
pub struct StringData {
    /// Character storage.
    pub backing: StrBacking,
}

/// Range payload.
#[derive(Debug, Default)]
pub struct RangeData {
    /// Lower bound.
    pub begin: Value,
    /// Upper bound.
    pub end: Value,
    /// True if the upper bound is excluded.
    pub exclusive: bool,
}

/// Release hook invoked when a foreign handle is finalized.
pub type ForeignRelease = fn(Box<dyn Any>);

/// Foreign-data payload: opaque host data plus an optional release hook.
#[derive(Default)]
pub struct ForeignData {
    /// Host-owned data.
    pub data: Option<Box<dyn Any>>,
    /// Called with the data when the object is reclaimed.
    pub release: Option<ForeignRelease>,
    /// Named instance variables.
    pub ivars: FxHashMap<Symbol, Value>,
}

impl Drop for ForeignData {
    fn drop(&mut self) {
        if let (Some(data), Some(release)) = (self.data.take(), self.release) {
            release(data);
        }
    }
}

impl std::fmt::Debug for ForeignData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignData")
            .field("has_data", &self.data.is_some())
            .field("has_release", &self.release.is_some())
            .field("ivars", &self.ivars)
            .finish()
    }
}

/// Proc payload.
#[derive(Debug, Default)]
pub struct ProcData {
    /// Lexically enclosing proc.
    pub upper: Option<ObjRef>,
    /// Captured environment.
    pub env: Option<ObjRef>,
    /// Compiled body; reference-counted, dropped on finalization.
    pub body: Option<Rc<Chunk>>,
}

/// Where an environment's captured slots live.
#[derive(Debug)]
pub enum EnvBacking {
    /// Still aliasing a live region of a context's operand stack.
    Stack {
        /// Context whose stack backs this environment.
        ctx: ContextHandle,
        /// First aliased stack index.
        base: usize,
        /// Number of captured slots.
        len: usize,
    },
    /// Owned heap storage (the environment has been closed or unshared).
    Owned(Vec<Value>),
}

impl Default for EnvBacking {
    fn default() -> Self {
        EnvBacking::Owned(Vec::new())
    }
}

/// Captured-environment payload.
///
/// Captured slots are always traced up to the logical length, whether or
/// not the environment has been closed: stack-backed storage may be shared
/// with a live operand stack.
#[derive(Debug, Default)]
pub struct EnvData {
    /// Slot storage.
    pub backing: EnvBacking,
}

impl EnvData {
    /// Logical number of captured slots.
    pub fn len(&self) -> usize {
        match &self.backing {
            EnvBacking::Stack { len, .. } => *len,
            EnvBacking::Owned(v) => v.len(),
        }
    }

    /// True if no slots are captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fiber payload: an owned execution context, absent once terminated and
/// reclaimed.
#[derive(Debug, Default)]
pub struct FiberData {
    /// The fiber's execution context.
    pub context: Option<Box<Context>>,
}

/// Exception payload.
#[derive(Debug, Default)]
pub struct ExceptionData {
    /// Named instance variables.
    pub ivars: FxHashMap<Symbol, Value>,
    /// Message string object.
    pub message: Option<ObjRef>,
    /// Captured backtrace object.
    pub backtrace: Option<ObjRef>,
}

/// One backtrace location.
#[derive(Debug)]
pub struct Location {
    /// Code chunk the frame was executing, if any.
    pub chunk: Option<Rc<Chunk>>,
    /// Instruction offset within the chunk.
    pub pc: usize,
}

/// Backtrace payload. Locations hold reference-counted chunks, not traced
/// references.
#[derive(Debug, Default)]
pub struct BacktraceData {
    /// Captured frames, innermost first.
    pub locations: Vec<Location>,
}

/// Struct-like aggregate payload.
#[derive(Debug, Default)]
pub struct StructData {
    /// Fixed field list.
    pub fields: Vec<Value>,
}

/// Arbitrary-precision integer payload.
#[derive(Debug, Default)]
pub struct BigIntData {
    /// Sign: true if negative.
    pub negative: bool,
    /// Little-endian magnitude digits.
    pub digits: Vec<u32>,
}

/// Payload of a heap slot: the closed kind set.
#[derive(Debug)]
pub enum Payload {
    /// Free slot; `next` is the intra-page free-list link.
    Free {
        /// Next free slot index within the same page.
        next: Option<u32>,
    },
    /// Plain object.
    Object(ObjectData),
    /// Class.
    Class(ClassData),
    /// Module.
    Module(ClassData),
    /// Singleton class.
    SClass(ClassData),
    /// Array.
    Array(ArrayData),
    /// Hash table.
    Hash(HashData),
    /// String.
    Str(StringData),
    /// Range.
    Range(RangeData),
    /// Foreign data handle.
    Foreign(ForeignData),
    /// Proc / closure.
    Proc(ProcData),
    /// Captured environment.
    Env(EnvData),
    /// Fiber.
    Fiber(FiberData),
    /// Exception.
    Exception(ExceptionData),
    /// Backtrace.
    Backtrace(BacktraceData),
    /// Struct-like aggregate.
    Struct(StructData),
    /// Big integer.
    BigInt(BigIntData),
}

impl Payload {
    /// Create the zeroed payload for a kind. `Free` slots start unlinked.
    pub fn new(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Free => Payload::Free { next: None },
            ObjectKind::Object => Payload::Object(ObjectData::default()),
            ObjectKind::Class => Payload::Class(ClassData::default()),
            ObjectKind::Module => Payload::Module(ClassData::default()),
            ObjectKind::SClass => Payload::SClass(ClassData::default()),
            ObjectKind::Array => Payload::Array(ArrayData::default()),
            ObjectKind::Hash => Payload::Hash(HashData::default()),
            ObjectKind::Str => Payload::Str(StringData::default()),
            ObjectKind::Range => Payload::Range(RangeData::default()),
            ObjectKind::Foreign => Payload::Foreign(ForeignData::default()),
            ObjectKind::Proc => Payload::Proc(ProcData::default()),
            ObjectKind::Env => Payload::Env(EnvData::default()),
            ObjectKind::Fiber => Payload::Fiber(FiberData::default()),
            ObjectKind::Exception => Payload::Exception(ExceptionData::default()),
            ObjectKind::Backtrace => Payload::Backtrace(BacktraceData::default()),
            ObjectKind::Struct => Payload::Struct(StructData::default()),
            ObjectKind::BigInt => Payload::BigInt(BigIntData::default()),
        }
    }

    /// Kind tag of this payload.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Payload::Free { .. } => ObjectKind::Free,
            Payload::Object(_) => ObjectKind::Object,
            Payload::Class(_) => ObjectKind::Class,
            Payload::Module(_) => ObjectKind::Module,
            Payload::SClass(_) => ObjectKind::SClass,
            Payload::Array(_) => ObjectKind::Array,
            Payload::Hash(_) => ObjectKind::Hash,
            Payload::Str(_) => ObjectKind::Str,
            Payload::Range(_) => ObjectKind::Range,
            Payload::Foreign(_) => ObjectKind::Foreign,
            Payload::Proc(_) => ObjectKind::Proc,
            Payload::Env(_) => ObjectKind::Env,
            Payload::Fiber(_) => ObjectKind::Fiber,
            Payload::Exception(_) => ObjectKind::Exception,
            Payload::Backtrace(_) => ObjectKind::Backtrace,
            Payload::Struct(_) => ObjectKind::Struct,
            Payload::BigInt(_) => ObjectKind::BigInt,
        }
    }

    /// True for a free slot.
    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self, Payload::Free { .. })
    }

    /// Instance-variable table, for the kinds that carry one.
    pub fn ivars(&self) -> Option<&FxHashMap<Symbol, Value>> {
        match self {
            Payload::Object(d) => Some(&d.ivars),
            Payload::Class(d) | Payload::Module(d) | Payload::SClass(d) => Some(&d.ivars),
            Payload::Hash(d) => Some(&d.ivars),
            Payload::Foreign(d) => Some(&d.ivars),
            Payload::Exception(d) => Some(&d.ivars),
            _ => None,
        }
    }

    /// Mutable instance-variable table, for the kinds that carry one.
    pub fn ivars_mut(&mut self) -> Option<&mut FxHashMap<Symbol, Value>> {
        match self {
            Payload::Object(d) => Some(&mut d.ivars),
            Payload::Class(d) | Payload::Module(d) | Payload::SClass(d) => Some(&mut d.ivars),
            Payload::Hash(d) => Some(&mut d.ivars),
            Payload::Foreign(d) => Some(&mut d.ivars),
            Payload::Exception(d) => Some(&mut d.ivars),
            _ => None,
        }
    }
}

/// One heap object slot: header plus payload.
#[derive(Debug)]
pub struct Slot {
    /// Tri-color mark state.
    pub color: Color,
    /// Owning class.
    pub class: Option<ObjRef>,
    /// Gray worklist link; meaningful only while `color` is `Gray`.
    pub gc_next: Option<ObjRef>,
    /// Kind-tagged payload.
    pub payload: Payload,
}

impl Slot {
    /// A free, unlinked slot.
    pub fn free() -> Self {
        Self {
            color: Color::WhiteA,
            class: None,
            gc_next: None,
            payload: Payload::Free { next: None },
        }
    }

    /// Kind tag of this slot.
    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind_roundtrip() {
        let kinds = [
            ObjectKind::Free,
            ObjectKind::Object,
            ObjectKind::Class,
            ObjectKind::Module,
            ObjectKind::SClass,
            ObjectKind::Array,
            ObjectKind::Hash,
            ObjectKind::Str,
            ObjectKind::Range,
            ObjectKind::Foreign,
            ObjectKind::Proc,
            ObjectKind::Env,
            ObjectKind::Fiber,
            ObjectKind::Exception,
            ObjectKind::Backtrace,
            ObjectKind::Struct,
            ObjectKind::BigInt,
        ];
        for kind in kinds {
            assert_eq!(Payload::new(kind).kind(), kind);
        }
    }

    #[test]
    fn test_env_logical_length() {
        let owned = EnvData {
            backing: EnvBacking::Owned(vec![Value::Nil, Value::Int(1)]),
        };
        assert_eq!(owned.len(), 2);

        let stacked = EnvData {
            backing: EnvBacking::Stack {
                ctx: ContextHandle::Root,
                base: 4,
                len: 3,
            },
        };
        assert_eq!(stacked.len(), 3);
        assert!(!stacked.is_empty());
    }
}
