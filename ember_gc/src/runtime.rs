//! The runtime: heap, symbol table, builtin classes, and the allocation
//! front door.
//!
//! [`Runtime`] owns one [`Gc`] and everything the collector treats as a
//! root that is not itself a heap object: the global variable table, the
//! primary execution context, the builtin class graph, the pending
//! exception, and the two pre-allocated error objects (out-of-memory and
//! arena overflow) that must be raisable without allocating.
//!
//! All mutation helpers here pair their stores with the appropriate write
//! barrier; embedders reaching into payloads directly must do the same.

use rustc_hash::FxHashMap;

use crate::config::GcConfig;
use crate::context::{Context, ContextHandle, FiberStatus};
use crate::heap::Gc;
use crate::object::{EnvBacking, ObjectKind, Payload, StrBacking};
use crate::stats::GcStats;
use crate::{Color, GcState};
use ember_core::{ObjRef, Raised, Symbol, SymbolTable, Value, VmResult};

/// An embeddable runtime instance with a garbage-collected heap.
///
/// Independent instances share nothing; each carries its own heap, symbol
/// table, and class graph. The runtime is single-threaded: the collector
/// only runs inside allocation and explicit collection calls.
#[derive(Debug)]
pub struct Runtime {
    pub(crate) gc: Gc,
    pub(crate) symbols: SymbolTable,
    pub(crate) globals: FxHashMap<Symbol, Value>,
    pub(crate) root_context: Context,
    pub(crate) current: ContextHandle,

    pub(crate) object_class: ObjRef,
    pub(crate) class_class: ObjRef,
    pub(crate) module_class: ObjRef,
    pub(crate) string_class: ObjRef,
    pub(crate) array_class: ObjRef,
    pub(crate) hash_class: ObjRef,
    pub(crate) range_class: ObjRef,
    pub(crate) proc_class: ObjRef,
    pub(crate) fiber_class: ObjRef,
    pub(crate) exception_class: ObjRef,
    pub(crate) standard_error_class: ObjRef,
    pub(crate) runtime_error_class: ObjRef,
    pub(crate) type_error_class: ObjRef,
    pub(crate) no_memory_error_class: ObjRef,
    pub(crate) kernel_module: ObjRef,
    pub(crate) top_self: ObjRef,

    /// Pending exception, if a raise is in flight.
    pub(crate) exc: Option<ObjRef>,
    /// Pre-allocated out-of-memory error; raised without allocating.
    pub(crate) nomem_err: ObjRef,
    /// Pre-allocated arena overflow error; raised without allocating.
    pub(crate) arena_err: ObjRef,
}

/// Bootstrap allocation: no GC trigger, no type check, no arena protection.
/// Only used while the runtime is being constructed, before any collection
/// can run.
fn raw_alloc(gc: &mut Gc, kind: ObjectKind, class: Option<ObjRef>) -> ObjRef {
    if gc.free_heaps.is_none() {
        gc.add_page();
    }
    let r = gc.allocate_slot();
    let white = gc.current_white;
    if let Some(slot) = gc.slot_mut(r) {
        slot.payload = Payload::new(kind);
        slot.class = class;
        slot.color = white;
        slot.gc_next = None;
    }
    gc.live += 1;
    gc.stats.objects_allocated += 1;
    r
}

fn init_class(
    gc: &mut Gc,
    class: ObjRef,
    name: Symbol,
    superclass: Option<ObjRef>,
    instance_kind: Option<ObjectKind>,
) {
    if let Some(slot) = gc.slot_mut(class) {
        if let Payload::Class(d) | Payload::Module(d) | Payload::SClass(d) = &mut slot.payload {
            d.name = Some(name);
            d.superclass = superclass;
            d.instance_kind = instance_kind;
        }
    }
}

fn prealloc_error(gc: &mut Gc, string_class: ObjRef, class: ObjRef, msg: &str) -> ObjRef {
    let message = raw_alloc(gc, ObjectKind::Str, Some(string_class));
    if let Some(slot) = gc.slot_mut(message) {
        if let Payload::Str(d) = &mut slot.payload {
            d.backing = StrBacking::Owned(msg.to_string());
        }
    }
    let err = raw_alloc(gc, ObjectKind::Exception, Some(class));
    if let Some(slot) = gc.slot_mut(err) {
        if let Payload::Exception(d) = &mut slot.payload {
            d.message = Some(message);
        }
    }
    err
}

impl Runtime {
    /// Create a runtime with the given collector configuration.
    ///
    /// Panics if the configuration is invalid; call
    /// [`GcConfig::validate`] first when the values are untrusted.
    pub fn new(config: GcConfig) -> Self {
        let mut gc = Gc::new(config);
        let mut symbols = SymbolTable::new();

        let object_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let class_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let module_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let string_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let array_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let hash_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let range_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let proc_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let fiber_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let exception_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let standard_error_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let runtime_error_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let type_error_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let no_memory_error_class = raw_alloc(&mut gc, ObjectKind::Class, None);
        let kernel_module = raw_alloc(&mut gc, ObjectKind::Module, None);

        let classes = [
            object_class,
            class_class,
            module_class,
            string_class,
            array_class,
            hash_class,
            range_class,
            proc_class,
            fiber_class,
            exception_class,
            standard_error_class,
            runtime_error_class,
            type_error_class,
            no_memory_error_class,
        ];
        for c in classes {
            if let Some(slot) = gc.slot_mut(c) {
                slot.class = Some(class_class);
            }
        }
        if let Some(slot) = gc.slot_mut(kernel_module) {
            slot.class = Some(module_class);
        }

        let sym_object = symbols.intern("Object");
        init_class(&mut gc, object_class, sym_object, None, Some(ObjectKind::Object));
        let sym = symbols.intern("Module");
        init_class(&mut gc, module_class, sym, Some(object_class), Some(ObjectKind::Module));
        let sym = symbols.intern("Class");
        init_class(&mut gc, class_class, sym, Some(module_class), Some(ObjectKind::Class));
        let sym = symbols.intern("String");
        init_class(&mut gc, string_class, sym, Some(object_class), Some(ObjectKind::Str));
        let sym = symbols.intern("Array");
        init_class(&mut gc, array_class, sym, Some(object_class), Some(ObjectKind::Array));
        let sym = symbols.intern("Hash");
        init_class(&mut gc, hash_class, sym, Some(object_class), Some(ObjectKind::Hash));
        let sym = symbols.intern("Range");
        init_class(&mut gc, range_class, sym, Some(object_class), Some(ObjectKind::Range));
        let sym = symbols.intern("Proc");
        init_class(&mut gc, proc_class, sym, Some(object_class), Some(ObjectKind::Proc));
        let sym = symbols.intern("Fiber");
        init_class(&mut gc, fiber_class, sym, Some(object_class), Some(ObjectKind::Fiber));
        let sym = symbols.intern("Exception");
        init_class(
            &mut gc,
            exception_class,
            sym,
            Some(object_class),
            Some(ObjectKind::Exception),
        );
        let sym = symbols.intern("StandardError");
        init_class(
            &mut gc,
            standard_error_class,
            sym,
            Some(exception_class),
            Some(ObjectKind::Exception),
        );
        let sym = symbols.intern("RuntimeError");
        init_class(
            &mut gc,
            runtime_error_class,
            sym,
            Some(standard_error_class),
            Some(ObjectKind::Exception),
        );
        let sym = symbols.intern("TypeError");
        init_class(
            &mut gc,
            type_error_class,
            sym,
            Some(standard_error_class),
            Some(ObjectKind::Exception),
        );
        let sym = symbols.intern("NoMemoryError");
        init_class(
            &mut gc,
            no_memory_error_class,
            sym,
            Some(exception_class),
            Some(ObjectKind::Exception),
        );
        let sym = symbols.intern("Kernel");
        init_class(&mut gc, kernel_module, sym, None, None);

        let top_self = raw_alloc(&mut gc, ObjectKind::Object, Some(object_class));
        let nomem_err = prealloc_error(&mut gc, string_class, no_memory_error_class, "Out of memory");
        let arena_err =
            prealloc_error(&mut gc, string_class, runtime_error_class, "arena overflow error");

        let mut root_context = Context::new();
        root_context.status = FiberStatus::Running;

        log::debug!("runtime initialized: {} bootstrap objects", gc.live_count());

        Self {
            gc,
            symbols,
            globals: FxHashMap::default(),
            root_context,
            current: ContextHandle::Root,
            object_class,
            class_class,
            module_class,
            string_class,
            array_class,
            hash_class,
            range_class,
            proc_class,
            fiber_class,
            exception_class,
            standard_error_class,
            runtime_error_class,
            type_error_class,
            no_memory_error_class,
            kernel_module,
            top_self,
            exc: None,
            nomem_err,
            arena_err,
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a new object of `kind` as an instance of `class`.
    ///
    /// The new object is arena-protected and painted the current white. May
    /// run an incremental collection first when the allocation threshold
    /// has been passed.
    ///
    /// # Errors
    ///
    /// Raises a type error if `class` cannot produce instances of `kind`,
    /// and the pre-allocated out-of-memory error if the heap is at its
    /// configured ceiling and a full collection frees nothing.
    pub fn allocate(&mut self, kind: ObjectKind, class: Option<ObjRef>) -> VmResult<ObjRef> {
        if kind == ObjectKind::Free {
            return Err(self.raise_type_error("allocation failure"));
        }
        if let Some(cls) = class {
            self.check_allocation_class(kind, cls)?;
        }

        if self.gc.threshold < self.gc.live {
            self.collect_incremental();
        }
        if self.gc.free_heaps.is_none() {
            self.grow_heap()?;
        }

        let r = self.gc.allocate_slot();
        let white = self.gc.current_white;
        if let Some(slot) = self.gc.slot_mut(r) {
            slot.payload = Payload::new(kind);
            slot.class = class;
            slot.color = white;
            slot.gc_next = None;
        }
        self.gc.live += 1;
        self.gc.stats.objects_allocated += 1;
        self.gc.out_of_memory = false;
        self.protect(r)?;
        Ok(r)
    }

    /// Instance-kind check: a class only produces objects of its declared
    /// instance kind. Singleton classes, environments and big integers are
    /// exempt (they borrow an owner class), as are foreign and struct
    /// objects hung off the base object class.
    fn check_allocation_class(&mut self, kind: ObjectKind, cls: ObjRef) -> VmResult<()> {
        let info = match self.gc.slot(cls) {
            Some(slot) => match &slot.payload {
                Payload::Class(d) | Payload::Module(d) | Payload::SClass(d) => {
                    Some((d.instance_kind, d.name))
                }
                _ => None,
            },
            None => None,
        };
        let (instance_kind, name) = match info {
            Some(t) => t,
            None => return Err(self.raise_type_error("allocation failure")),
        };

        if let Some(expected) = instance_kind {
            let exempt = matches!(
                kind,
                ObjectKind::SClass | ObjectKind::Env | ObjectKind::BigInt
            ) || (cls == self.object_class
                && matches!(kind, ObjectKind::Foreign | ObjectKind::Struct));
            if kind != expected && !exempt {
                let label = name
                    .and_then(|s| self.symbols.name(s))
                    .unwrap_or("?")
                    .to_string();
                return Err(self.raise_type_error(&format!("allocation failure of {label}")));
            }
        }
        Ok(())
    }

    /// Ensure at least one page has a free slot, respecting the configured
    /// slot ceiling.
    fn grow_heap(&mut self) -> VmResult<()> {
        let max = self.gc.config.max_objects;
        let page_cap = self.gc.config.page_capacity;
        if max == 0 || self.gc.total_slots() + page_cap <= max {
            self.gc.add_page();
            return Ok(());
        }

        // At the ceiling: a full collection may open slots on existing
        // pages.
        self.collect();
        if self.gc.free_heaps.is_some() {
            return Ok(());
        }
        log::warn!(
            "heap exhausted: {} live objects at ceiling {}",
            self.gc.live_count(),
            max
        );
        self.gc.out_of_memory = true;
        self.exc = Some(self.nomem_err);
        Err(Raised {
            exception: self.nomem_err,
        })
    }

    /// Allocate a string object with owned contents.
    pub fn alloc_string(&mut self, s: &str) -> VmResult<ObjRef> {
        let class = self.string_class;
        let r = self.allocate(ObjectKind::Str, Some(class))?;
        if let Some(slot) = self.gc.slot_mut(r) {
            if let Payload::Str(d) = &mut slot.payload {
                d.backing = StrBacking::Owned(s.to_string());
            }
        }
        Ok(r)
    }

    /// Allocate an array object owning `values`. No barrier is needed: the
    /// new array is white.
    pub fn alloc_array(&mut self, values: Vec<Value>) -> VmResult<ObjRef> {
        let class = self.array_class;
        let r = self.allocate(ObjectKind::Array, Some(class))?;
        if let Some(slot) = self.gc.slot_mut(r) {
            if let Payload::Array(d) = &mut slot.payload {
                d.backing = crate::object::ArrayBacking::Owned(values);
            }
        }
        Ok(r)
    }

    /// Allocate a range object.
    pub fn alloc_range(&mut self, begin: Value, end: Value, exclusive: bool) -> VmResult<ObjRef> {
        let class = self.range_class;
        let r = self.allocate(ObjectKind::Range, Some(class))?;
        if let Some(slot) = self.gc.slot_mut(r) {
            if let Payload::Range(d) = &mut slot.payload {
                d.begin = begin;
                d.end = end;
                d.exclusive = exclusive;
            }
        }
        Ok(r)
    }

    /// Allocate an exception object of `class` with an owned message
    /// string.
    pub fn alloc_exception(&mut self, class: ObjRef, msg: &str) -> VmResult<ObjRef> {
        let message = self.alloc_string(msg)?;
        let exc = self.allocate(ObjectKind::Exception, Some(class))?;
        if let Some(slot) = self.gc.slot_mut(exc) {
            if let Payload::Exception(d) = &mut slot.payload {
                d.message = Some(message);
            }
        }
        self.gc.field_write_barrier(exc, Value::Obj(message));
        Ok(exc)
    }

    /// Allocate a fiber with a fresh execution context.
    pub fn alloc_fiber(&mut self) -> VmResult<ObjRef> {
        let class = self.fiber_class;
        let r = self.allocate(ObjectKind::Fiber, Some(class))?;
        let mut ctx = Box::new(Context::new());
        ctx.fiber = Some(r);
        if let Some(slot) = self.gc.slot_mut(r) {
            if let Payload::Fiber(d) = &mut slot.payload {
                d.context = Some(ctx);
            }
        }
        Ok(r)
    }

    /// Allocate an environment aliasing `len` slots of a context's operand
    /// stack starting at `base`. The capture is unshared into owned storage
    /// if the owning fiber dies first.
    pub fn capture_stack_env(
        &mut self,
        ctx: ContextHandle,
        base: usize,
        len: usize,
    ) -> VmResult<ObjRef> {
        let r = self.allocate(ObjectKind::Env, None)?;
        if let Some(slot) = self.gc.slot_mut(r) {
            if let Payload::Env(d) = &mut slot.payload {
                d.backing = EnvBacking::Stack { ctx, base, len };
            }
        }
        Ok(r)
    }

    // =========================================================================
    // Raising
    // =========================================================================

    /// Build and set a pending exception of `class` with `msg`, returning
    /// the raise token. The arena is restored around the construction so
    /// raising does not leak protection slots.
    pub fn raise(&mut self, class: ObjRef, msg: &str) -> Raised {
        let save = self.arena_save();
        let raised = match self.alloc_exception(class, msg) {
            Ok(exc) => {
                self.exc = Some(exc);
                Raised { exception: exc }
            }
            // Exception construction itself failed (heap exhausted); the
            // inner raise already set the pending exception.
            Err(inner) => inner,
        };
        self.arena_restore(save);
        raised
    }

    pub(crate) fn raise_type_error(&mut self, msg: &str) -> Raised {
        let class = self.type_error_class;
        self.raise(class, msg)
    }

    pub(crate) fn raise_runtime_error(&mut self, msg: &str) -> Raised {
        let class = self.runtime_error_class;
        self.raise(class, msg)
    }

    // =========================================================================
    // Mutation helpers (barrier-paired)
    // =========================================================================

    /// Set an instance variable, with the field write barrier.
    pub fn set_ivar(&mut self, obj: ObjRef, name: Symbol, value: Value) -> VmResult<()> {
        let ok = match self.gc.slot_mut(obj) {
            Some(slot) => match slot.payload.ivars_mut() {
                Some(ivars) => {
                    ivars.insert(name, value);
                    true
                }
                None => false,
            },
            None => false,
        };
        if !ok {
            return Err(self.raise_type_error("cannot set instance variable"));
        }
        self.gc.field_write_barrier(obj, value);
        Ok(())
    }

    /// Read an instance variable; nil if absent.
    pub fn ivar(&self, obj: ObjRef, name: Symbol) -> Value {
        self.gc
            .slot(obj)
            .and_then(|slot| slot.payload.ivars())
            .and_then(|ivars| ivars.get(&name).copied())
            .unwrap_or(Value::Nil)
    }

    /// Define a method on a class or module, with the field write barrier.
    pub fn define_method(&mut self, class: ObjRef, name: Symbol, body: Value) -> VmResult<()> {
        let ok = match self.gc.slot_mut(class) {
            Some(slot) => match &mut slot.payload {
                Payload::Class(d) | Payload::Module(d) | Payload::SClass(d) => {
                    d.methods.insert(name, body);
                    true
                }
                _ => false,
            },
            None => false,
        };
        if !ok {
            return Err(self.raise_type_error("cannot define method"));
        }
        self.gc.field_write_barrier(class, body);
        Ok(())
    }

    /// Set a global variable. Globals are roots scanned every cycle, so no
    /// barrier is involved.
    pub fn set_global(&mut self, name: Symbol, value: Value) {
        self.globals.insert(name, value);
    }

    /// Read a global variable; nil if absent.
    pub fn global(&self, name: Symbol) -> Value {
        self.globals.get(&name).copied().unwrap_or(Value::Nil)
    }

    /// Append to an array, with the field write barrier. Shared backings
    /// are unshared first.
    pub fn array_push(&mut self, ary: ObjRef, value: Value) -> VmResult<()> {
        let ok = match self.gc.slot_mut(ary) {
            Some(slot) => match &mut slot.payload {
                Payload::Array(d) => {
                    d.backing.make_owned().push(value);
                    true
                }
                _ => false,
            },
            None => false,
        };
        if !ok {
            return Err(self.raise_type_error("not an array"));
        }
        self.gc.field_write_barrier(ary, value);
        Ok(())
    }

    /// Store into an array index, growing with nil as needed. Uses the
    /// object write barrier, the cheaper choice when indexed stores come in
    /// batches.
    pub fn array_set(&mut self, ary: ObjRef, index: usize, value: Value) -> VmResult<()> {
        self.gc.write_barrier(ary);
        let ok = match self.gc.slot_mut(ary) {
            Some(slot) => match &mut slot.payload {
                Payload::Array(d) => {
                    let vec = d.backing.make_owned();
                    if index >= vec.len() {
                        vec.resize(index + 1, Value::Nil);
                    }
                    vec[index] = value;
                    true
                }
                _ => false,
            },
            None => false,
        };
        if !ok {
            return Err(self.raise_type_error("not an array"));
        }
        Ok(())
    }

    /// Read an array element; nil when out of bounds.
    pub fn array_get(&self, ary: ObjRef, index: usize) -> Value {
        match self.gc.slot(ary) {
            Some(slot) => match &slot.payload {
                Payload::Array(d) => d
                    .backing
                    .elements()
                    .get(index)
                    .copied()
                    .unwrap_or(Value::Nil),
                _ => Value::Nil,
            },
            None => Value::Nil,
        }
    }

    /// Array length; zero for non-arrays.
    pub fn array_len(&self, ary: ObjRef) -> usize {
        match self.gc.slot(ary) {
            Some(slot) => match &slot.payload {
                Payload::Array(d) => d.backing.elements().len(),
                _ => 0,
            },
            None => 0,
        }
    }

    /// Insert or update a hash entry, with field write barriers for both
    /// key and value.
    pub fn hash_insert(&mut self, hash: ObjRef, key: Value, value: Value) -> VmResult<()> {
        let ok = match self.gc.slot_mut(hash) {
            Some(slot) => match &mut slot.payload {
                Payload::Hash(d) => {
                    match d.entries.iter_mut().find(|(k, _)| *k == key) {
                        Some(entry) => entry.1 = value,
                        None => d.entries.push((key, value)),
                    }
                    true
                }
                _ => false,
            },
            None => false,
        };
        if !ok {
            return Err(self.raise_type_error("not a hash"));
        }
        self.gc.field_write_barrier(hash, key);
        self.gc.field_write_barrier(hash, value);
        Ok(())
    }

    /// Look up a hash entry; nil if absent.
    pub fn hash_get(&self, hash: ObjRef, key: Value) -> Value {
        match self.gc.slot(hash) {
            Some(slot) => match &slot.payload {
                Payload::Hash(d) => d
                    .entries
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| *v)
                    .unwrap_or(Value::Nil),
                _ => Value::Nil,
            },
            None => Value::Nil,
        }
    }

    /// Attach a captured environment to a proc, with the field write
    /// barrier.
    pub fn proc_set_env(&mut self, proc_obj: ObjRef, env: ObjRef) -> VmResult<()> {
        let ok = match self.gc.slot_mut(proc_obj) {
            Some(slot) => match &mut slot.payload {
                Payload::Proc(d) => {
                    d.env = Some(env);
                    true
                }
                _ => false,
            },
            None => false,
        };
        if !ok {
            return Err(self.raise_type_error("not a proc"));
        }
        self.gc.field_write_barrier(proc_obj, Value::Obj(env));
        Ok(())
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    /// String contents, if `r` is a live string.
    pub fn str_value(&self, r: ObjRef) -> Option<&str> {
        match &self.gc.slot(r)?.payload {
            Payload::Str(d) => Some(d.backing.as_str()),
            _ => None,
        }
    }

    /// A captured environment slot; nil when out of range. Stack-backed
    /// captures read through to the owning context.
    pub fn env_value(&self, env: ObjRef, index: usize) -> Value {
        let data = match self.gc.slot(env) {
            Some(slot) => match &slot.payload {
                Payload::Env(d) => d,
                _ => return Value::Nil,
            },
            None => return Value::Nil,
        };
        match &data.backing {
            EnvBacking::Owned(v) => v.get(index).copied().unwrap_or(Value::Nil),
            EnvBacking::Stack { ctx, base, len } => {
                if index >= *len {
                    return Value::Nil;
                }
                match self.context_ref(*ctx) {
                    Some(c) => c.stack.get(base + index).copied().unwrap_or(Value::Nil),
                    None => Value::Nil,
                }
            }
        }
    }

    /// The class of an object.
    pub fn class_of(&self, r: ObjRef) -> Option<ObjRef> {
        self.gc.slot(r)?.class
    }

    /// Kind of an object, if the handle is live.
    pub fn kind_of(&self, r: ObjRef) -> Option<ObjectKind> {
        self.gc.kind_of(r)
    }

    /// True if the handle no longer refers to a live object.
    pub fn is_object_dead(&self, r: ObjRef) -> bool {
        self.gc.is_object_dead(r)
    }

    // =========================================================================
    // Pinning and symbols
    // =========================================================================

    /// Mark an object permanently live: it is never traced, aged, or
    /// swept. The object must only reference other permanent objects or
    /// immediates, since the marker will never look inside it again.
    pub fn make_permanent(&mut self, r: ObjRef) {
        if let Some(slot) = self.gc.slot_mut(r) {
            slot.color = Color::Red;
        }
    }

    /// Intern a symbol.
    pub fn intern(&mut self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    /// The symbol table.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    // =========================================================================
    // Contexts
    // =========================================================================

    /// The runtime's primary execution context.
    pub fn root_context_mut(&mut self) -> &mut Context {
        &mut self.root_context
    }

    /// The context owned by a fiber, if it is live and unterminated.
    pub fn fiber_context_mut(&mut self, fiber: ObjRef) -> Option<&mut Context> {
        match &mut self.gc.slot_mut(fiber)?.payload {
            Payload::Fiber(d) => d.context.as_deref_mut(),
            _ => None,
        }
    }

    /// Switch the current execution context. The previous current context
    /// remains reachable through resumer links or fiber objects.
    pub fn set_current_context(&mut self, ctx: ContextHandle) {
        self.current = ctx;
    }

    /// The current execution context handle.
    pub fn current_context(&self) -> ContextHandle {
        self.current
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Collector activity counters.
    pub fn gc_stats(&self) -> &GcStats {
        self.gc.stats()
    }

    /// Live object count.
    pub fn live_count(&self) -> usize {
        self.gc.live_count()
    }

    /// Number of heap pages currently allocated.
    pub fn page_count(&self) -> usize {
        self.gc.page_count()
    }

    /// Current collector phase.
    pub fn gc_state(&self) -> GcState {
        self.gc.state()
    }

    /// True if the last allocation failed for lack of storage.
    pub fn out_of_memory(&self) -> bool {
        self.gc.out_of_memory
    }

    /// True if generational mode is active.
    pub fn is_generational(&self) -> bool {
        self.gc.is_generational()
    }

    /// The threshold re-arm ratio applied at the end of each cycle, as a
    /// percentage of the post-mark live count.
    pub fn interval_ratio(&self) -> usize {
        self.gc.interval_ratio
    }

    /// Set the threshold re-arm ratio. Takes effect at the end of the next
    /// cycle.
    pub fn set_interval_ratio(&mut self, ratio: usize) {
        self.gc.interval_ratio = ratio;
    }

    /// The per-allocation step budget ratio, as a percentage of the step
    /// unit.
    pub fn step_ratio(&self) -> usize {
        self.gc.step_ratio
    }

    /// Set the per-allocation step budget ratio.
    pub fn set_step_ratio(&mut self, ratio: usize) {
        self.gc.step_ratio = ratio;
    }

    /// The pending exception, if any.
    pub fn exc(&self) -> Option<ObjRef> {
        self.exc
    }

    /// Clear the pending exception (rescue).
    pub fn clear_exc(&mut self) {
        self.exc = None;
    }

    /// The pre-allocated out-of-memory error object.
    pub fn nomem_error(&self) -> ObjRef {
        self.nomem_err
    }

    /// The pre-allocated arena overflow error object.
    pub fn arena_error(&self) -> ObjRef {
        self.arena_err
    }

    // =========================================================================
    // Builtin classes
    // =========================================================================

    /// The base object class.
    pub fn object_class(&self) -> ObjRef {
        self.object_class
    }

    /// The class of classes.
    pub fn class_class(&self) -> ObjRef {
        self.class_class
    }

    /// The class of modules.
    pub fn module_class(&self) -> ObjRef {
        self.module_class
    }

    /// The string class.
    pub fn string_class(&self) -> ObjRef {
        self.string_class
    }

    /// The array class.
    pub fn array_class(&self) -> ObjRef {
        self.array_class
    }

    /// The hash class.
    pub fn hash_class(&self) -> ObjRef {
        self.hash_class
    }

    /// The range class.
    pub fn range_class(&self) -> ObjRef {
        self.range_class
    }

    /// The proc class.
    pub fn proc_class(&self) -> ObjRef {
        self.proc_class
    }

    /// The fiber class.
    pub fn fiber_class(&self) -> ObjRef {
        self.fiber_class
    }

    /// The exception base class.
    pub fn exception_class(&self) -> ObjRef {
        self.exception_class
    }

    /// The standard error class.
    pub fn standard_error_class(&self) -> ObjRef {
        self.standard_error_class
    }

    /// The runtime error class.
    pub fn runtime_error_class(&self) -> ObjRef {
        self.runtime_error_class
    }

    /// The type error class.
    pub fn type_error_class(&self) -> ObjRef {
        self.type_error_class
    }

    /// The out-of-memory error class.
    pub fn no_memory_error_class(&self) -> ObjRef {
        self.no_memory_error_class
    }

    /// The kernel module.
    pub fn kernel_module(&self) -> ObjRef {
        self.kernel_module
    }

    /// The toplevel self object.
    pub fn top_self(&self) -> ObjRef {
        self.top_self
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(GcConfig::default())
    }
}
