//! Runtime objects the back end embeds in constant pools.
//!
//! The object model proper (containers, iterators, reference counting)
//! lives in the VM. This module only holds the values a compiler can
//! produce, plus the pure operator semantics used for constant folding.

pub mod function;
pub mod ops;
pub mod value;

pub use function::Function;
pub use value::{Type, Value};
