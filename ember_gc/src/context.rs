//! Execution contexts.
//!
//! A context is the heap-resident execution state of one cooperative fiber:
//! an operand stack, a chain of call frames, and a back-reference to the
//! context that resumed it. The root context belongs to the runtime itself;
//! every other context is owned by a fiber object. Suspended contexts are
//! ordinary data the root scanner must be able to reach, never a separate
//! thread-local root.

use ember_core::{ObjRef, Value};

/// Lifecycle status of a fiber's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberStatus {
    /// Created but never resumed.
    Created,
    /// Currently executing.
    Running,
    /// Suspended at a yield point.
    Suspended,
    /// Finished; scanning a terminated context is a no-op.
    Terminated,
}

/// Which context a handle refers to: the runtime's root context or the
/// context owned by a fiber object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextHandle {
    /// The runtime's primary context.
    Root,
    /// The context owned by the given fiber.
    Fiber(ObjRef),
}

/// One call frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Stack index where this frame's registers begin.
    pub base: usize,
    /// Number of registers the frame uses.
    pub nregs: usize,
    /// The executing procedure.
    pub proc_obj: Option<ObjRef>,
    /// Lexically captured class or module.
    pub target_class: Option<ObjRef>,
    /// Environment captured for this frame, if any.
    pub env: Option<ObjRef>,
}

impl Frame {
    /// A frame starting at `base` with `nregs` registers.
    pub fn new(base: usize, nregs: usize) -> Self {
        Self {
            base,
            nregs,
            proc_obj: None,
            target_class: None,
            env: None,
        }
    }
}

/// Execution state of one fiber (or of the runtime's primary thread of
/// control).
#[derive(Debug)]
pub struct Context {
    /// Operand stack. Slots past the live extent are dead and are nilled
    /// during root scanning.
    pub stack: Vec<Value>,
    /// Call frame chain, outermost first.
    pub frames: Vec<Frame>,
    /// Lifecycle status.
    pub status: FiberStatus,
    /// Context that resumed this one; root scanning follows the chain.
    pub prev: Option<ContextHandle>,
    /// Back-reference to the owning fiber object, if any.
    pub fiber: Option<ObjRef>,
}

impl Context {
    /// A fresh context with an empty stack.
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            status: FiberStatus::Created,
            prev: None,
            fiber: None,
        }
    }

    /// Live extent of the operand stack: the top frame's base plus its
    /// register count, clamped to the stack length. Zero when no frame is
    /// active (the entire stack is then dead).
    pub fn live_extent(&self) -> usize {
        match self.frames.last() {
            Some(frame) => (frame.base + frame.nregs).min(self.stack.len()),
            None => 0,
        }
    }

    /// Push a frame covering `nregs` registers starting at the current
    /// stack top, growing the stack to cover them.
    pub fn push_frame(&mut self, nregs: usize) -> &mut Frame {
        let base = self.stack.len();
        self.stack.resize(base + nregs, Value::Nil);
        self.frames.push(Frame::new(base, nregs));
        self.frames.last_mut().expect("frame just pushed")
    }

    /// Pop the top frame, shrinking the stack back to its base.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        self.stack.truncate(frame.base);
        Some(frame)
    }

    /// Store a value into a register of the top frame.
    ///
    /// This is a root store (operand stacks are scanned every cycle), so no
    /// write barrier is required.
    pub fn set_register(&mut self, reg: usize, value: Value) {
        if let Some(frame) = self.frames.last() {
            let idx = frame.base + reg;
            if idx < self.stack.len() {
                self.stack[idx] = value;
            }
        }
    }

    /// Read a register of the top frame.
    pub fn register(&self, reg: usize) -> Value {
        match self.frames.last() {
            Some(frame) => self.stack.get(frame.base + reg).copied().unwrap_or(Value::Nil),
            None => Value::Nil,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_extent_follows_frames() {
        let mut ctx = Context::new();
        assert_eq!(ctx.live_extent(), 0);

        ctx.push_frame(4);
        assert_eq!(ctx.live_extent(), 4);

        ctx.push_frame(2);
        assert_eq!(ctx.live_extent(), 6);

        ctx.pop_frame();
        assert_eq!(ctx.live_extent(), 4);
    }

    #[test]
    fn test_register_access() {
        let mut ctx = Context::new();
        ctx.push_frame(3);
        ctx.set_register(1, Value::Int(42));

        assert_eq!(ctx.register(1), Value::Int(42));
        assert_eq!(ctx.register(0), Value::Nil);
        assert_eq!(ctx.register(99), Value::Nil);
    }
}
