//! Raisable runtime errors.
//!
//! Every failure the runtime can surface to guest code is carried as a heap
//! exception object, so the interpreter can intercept it like any other
//! raise. `Raised` is the Rust-side wrapper: it holds the handle of the
//! exception object that was raised.
//!
//! Out-of-memory and arena overflow are reported through *pre-allocated*
//! exception singletons, so the report path never has to allocate.

use crate::value::ObjRef;

/// A raised guest-level exception.
///
/// The wrapped handle points at the exception object; for out-of-memory and
/// arena overflow it is one of the runtime's pre-allocated singletons and is
/// identity-stable across repeated failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raised {
    /// The exception object that was raised.
    pub exception: ObjRef,
}

impl Raised {
    /// Wrap an exception object.
    #[inline]
    pub const fn new(exception: ObjRef) -> Self {
        Self { exception }
    }
}

impl std::fmt::Display for Raised {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "exception raised (object {}:{})",
            self.exception.page(),
            self.exception.slot()
        )
    }
}

impl std::error::Error for Raised {}

/// Result type for fallible runtime operations.
pub type VmResult<T> = Result<T, Raised>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raised_identity() {
        let a = Raised::new(ObjRef::new(0, 7));
        let b = Raised::new(ObjRef::new(0, 7));
        let c = Raised::new(ObjRef::new(1, 7));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
