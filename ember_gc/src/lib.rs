//! Ember garbage collector.
//!
//! A tri-color incremental mark-and-sweep collector with an optional
//! generational mode, designed for a single-threaded cooperative runtime:
//! the collector only runs at allocation points and explicit collection
//! requests, never concurrently with mutator code.
//!
//! # Architecture
//!
//! - **Heap pages**: the heap is carved into fixed-capacity pages of object
//!   slots with an intrusive free list per page ([`heap`]).
//! - **Tri-color marking**: objects are painted White (unvisited), Gray
//!   (queued), or Black (fully scanned). Two white shades alternate per
//!   cycle so the sweep target can be distinguished from newly created
//!   objects with an O(1) flip instead of an O(heap) repaint ([`marker`]).
//! - **Write barriers**: mutators must call a barrier whenever a reference
//!   is stored into a heap object, which is what keeps incremental marking
//!   sound ([`barrier`]).
//! - **Incremental sweeping**: dead slots are reclaimed page by page with a
//!   resume cursor, and fully dead pages are released outright ([`sweep`]).
//! - **Generational mode**: surviving objects stay Black ("old") after each
//!   cycle; minor collections trace only young objects and skip pages
//!   flagged old, while a major collection erases the partition and runs a
//!   full cycle ([`scheduler`]).
//!
//! # Usage
//!
//! ```
//! use ember_gc::{GcConfig, ObjectKind, Runtime};
//!
//! let mut rt = Runtime::new(GcConfig::default());
//! let class = rt.object_class();
//! let obj = rt.allocate(ObjectKind::Object, Some(class)).unwrap();
//!
//! // Keep it alive across GC points:
//! rt.register_root(obj);
//! rt.collect();
//! assert!(!rt.is_object_dead(obj));
//! ```
//!
//! # Write barrier contract
//!
//! Every store of a reference into a heap object field must be paired with
//! [`Runtime::field_write_barrier`] (or [`Runtime::write_barrier`] for
//! frequently mutated containers). Forgetting a barrier can let a fully
//! scanned object retain an invisible reference to a condemned object.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod config;
pub mod context;
pub mod heap;
pub mod marker;
pub mod object;
pub mod roots;
pub mod runtime;
pub mod scheduler;
pub mod stats;
pub mod sweep;

pub use config::{ConfigError, GcConfig};
pub use context::{Context, ContextHandle, FiberStatus, Frame};
pub use object::{ObjectKind, Payload};
pub use runtime::Runtime;
pub use stats::GcStats;

pub use ember_core::{ObjRef, Raised, Symbol, Value, VmResult};

/// Object color for tri-color marking.
///
/// The two white shades alternate in meaning each cycle: one is the
/// "current" white (newly created this cycle), the other is the sweep
/// target. `Red` is a sentinel for permanently live objects that are never
/// traversed or aged.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Marked, children not yet scanned (on a gray worklist).
    Gray = 0,
    /// First white shade.
    WhiteA = 1,
    /// Second white shade.
    WhiteB = 2,
    /// Marked, all children scanned.
    Black = 4,
    /// Permanently live; never traversed, never swept, never aged.
    Red = 7,
}

impl Color {
    /// True for either white shade.
    #[inline]
    pub const fn is_white(self) -> bool {
        matches!(self, Color::WhiteA | Color::WhiteB)
    }

    /// The opposite white shade. Only meaningful for white colors.
    #[inline]
    pub const fn other_white(self) -> Color {
        match self {
            Color::WhiteA => Color::WhiteB,
            _ => Color::WhiteA,
        }
    }
}

/// Collector phase.
///
/// The cycle is ROOT -> MARK -> SWEEP -> ROOT, advanced in bounded
/// increments interleaved with allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    /// Scanning roots; initial and terminal state of each cycle.
    Root,
    /// Incrementally draining the gray worklist.
    Mark,
    /// Incrementally reclaiming dead slots.
    Sweep,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_shades_flip() {
        assert_eq!(Color::WhiteA.other_white(), Color::WhiteB);
        assert_eq!(Color::WhiteB.other_white(), Color::WhiteA);
        assert!(Color::WhiteA.is_white());
        assert!(Color::WhiteB.is_white());
        assert!(!Color::Black.is_white());
        assert!(!Color::Red.is_white());
    }
}
