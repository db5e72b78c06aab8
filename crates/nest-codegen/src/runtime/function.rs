//! Function objects produced by the assembler.

use crate::assembler::Bytecode;
use std::sync::Arc;

/// An assembled function, stored in the constant pool of the bytecode that
/// defines it.
#[derive(Debug, Clone)]
pub struct Function {
    /// The parameter names
    pub params: Vec<Arc<str>>,
    /// The assembled body
    pub body: Bytecode,
}

impl Function {
    /// Creates a new function.
    pub fn new(params: Vec<Arc<str>>, body: Bytecode) -> Self {
        Self { params, body }
    }

    /// Returns the arity (number of parameters).
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}
