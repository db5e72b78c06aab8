//! Compiler from syntax trees to instruction lists.
//!
//! # Module Structure
//!
//! - `instruction`: IR instructions, operands and instruction lists
//! - `codegen`: Lowering of tree nodes to instructions
//!   - `codegen::statements`: Instruction layouts of statements
//!   - `codegen::expressions`: Instruction layouts of expressions

pub mod codegen;
pub mod instruction;

pub use codegen::Compiler;
pub use instruction::{FuncPrototype, InstCode, InstList, Instruction, Operand};
