//! Ember core types.
//!
//! This crate holds the small set of types shared by every component of the
//! Ember runtime: the tagged `Value` representation (immediates plus heap
//! handles), symbol interning, and the raisable-error type that all fallible
//! runtime operations return.
//!
//! The crate deliberately knows nothing about the heap layout itself; an
//! [`ObjRef`] is an opaque handle that only the collector crate can resolve.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod symbol;
pub mod value;

pub use error::{Raised, VmResult};
pub use symbol::{Symbol, SymbolTable};
pub use value::{ObjRef, Value};
