// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # nest-codegen
//!
//! The code generation back end of the Nest scripting language.
//!
//! ## Overview
//!
//! This crate turns a parsed syntax tree into the flat bytecode executed by
//! the Nest virtual machine. The pipeline has four stages:
//! - Tree optimizer: constant folding and dead branch pruning
//! - Compiler: lowering of the tree to a list of IR instructions
//! - IR optimizer: peephole rewrites run to a fixed point
//! - Assembler: jump relaxation and packing into 16-bit words
//!
//! The lexer, the parser and the virtual machine live elsewhere.
//!
//! ## Quick Start
//!
//! ```rust
//! use nest_codegen::ast::{Node, Operator};
//! use nest_codegen::{Options, compile_unit};
//!
//! let tree = Node::block(vec![Node::assign(
//!     Node::access("x"),
//!     Node::stack_op(Operator::Add, vec![Node::value(1), Node::value(2)]),
//! )]);
//! let bytecode = compile_unit(tree, &Options::default()).unwrap();
//! assert!(!bytecode.words.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod ast;
pub mod compiler;
pub mod config;
pub mod optimizer;
pub mod runtime;

use thiserror::Error;
use tracing::{debug, instrument};

pub use assembler::Bytecode;
pub use ast::{Node, Span};
pub use compiler::{Compiler, InstList};
pub use config::{OptLevel, Options};
pub use runtime::value::{Type, Value};

/// Errors that can occur while compiling a unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Evaluating a constant expression failed
    #[error("{span}: {message}")]
    Fold {
        /// The folded node
        span: Span,
        /// What went wrong
        message: String,
    },
    /// A buffer could not grow
    #[error("out of memory while growing {what}")]
    Allocation {
        /// The buffer that failed to grow
        what: &'static str,
    },
    /// `break` or `continue` outside of any loop or switch
    #[error("{span}: '{keyword}' outside of a loop or switch")]
    StrayJump {
        /// The statement
        span: Span,
        /// `break` or `continue`
        keyword: &'static str,
    },
    /// The tree has a shape the parser never produces
    #[error("{span}: malformed syntax tree: {message}")]
    Malformed {
        /// The offending node
        span: Span,
        /// What is wrong with it
        message: &'static str,
    },
    /// An instruction operand is too large to encode
    #[error("{span}: operand {value} does not fit in 32 bits")]
    Operand {
        /// The instruction
        span: Span,
        /// The operand
        value: i64,
    },
}

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, Error>;

/// Appends `item` to `vec`, reporting allocation failure instead of aborting.
pub(crate) fn try_push<T>(vec: &mut Vec<T>, item: T, what: &'static str) -> Result<()> {
    vec.try_reserve(1)
        .map_err(|_| Error::Allocation { what })?;
    vec.push(item);
    Ok(())
}

/// Runs every stage up to, and excluding, assembly.
#[instrument(skip_all, fields(opt_level = %options.opt_level))]
pub fn compile_to_ir(tree: Node, options: &Options) -> Result<InstList> {
    let tree = if options.optimize_tree() {
        optimizer::optimize_tree(tree)?
    } else {
        tree
    };

    let mut list = Compiler::new().compile(&tree, options.is_module)?;
    debug!(instructions = list.len(), "compiled syntax tree");

    if options.optimize_ir() {
        optimizer::optimize_ir(&mut list, options.substitute_builtins())?;
        debug!(instructions = list.len(), "optimized instruction list");
    }
    Ok(list)
}

/// Compiles a syntax tree to bytecode.
///
/// # Errors
///
/// Fails when constant folding hits an error the program would raise at
/// runtime, when the tree contains a stray `break` or `continue`, or when
/// memory runs out.
#[instrument(skip_all)]
pub fn compile_unit(tree: Node, options: &Options) -> Result<Bytecode> {
    let list = compile_to_ir(tree, options)?;
    let bytecode = assembler::assemble(&list)?;
    debug!(
        words = bytecode.words.len(),
        constants = bytecode.constants.len(),
        "assembled unit"
    );
    Ok(bytecode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use crate::compiler::InstCode;

    #[test]
    fn test_compile_unit_folds_constants() {
        let tree = Node::block(vec![Node::ret(Some(Node::stack_op(
            Operator::Add,
            vec![Node::value(1), Node::value(2), Node::value(3)],
        )))]);

        for level in [OptLevel::Tree, OptLevel::Peephole, OptLevel::Builtins] {
            let options = Options::new().with_opt_level(level);
            let list = compile_to_ir(tree.clone(), &options).unwrap();
            let codes: Vec<_> = list.instructions.iter().map(|inst| inst.code).collect();
            assert_eq!(codes, [InstCode::PushVal, InstCode::ReturnVal], "at {level}");
            assert_eq!(list.constant_of(&list.instructions[0]), Some(&Value::Int(6)));
        }

        let bytecode = compile_unit(tree, &Options::default()).unwrap();
        assert_eq!(bytecode.words.len(), 2);
        assert!(bytecode.constants.contains(&Value::Int(6)));
    }

    #[test]
    fn test_fold_error_carries_span() {
        let span = Span::new(ast::Pos::new(1, 2), ast::Pos::new(1, 7));
        let tree = Node::block(vec![Node::assign(
            Node::access("x"),
            Node::stack_op(Operator::Div, vec![Node::value(1), Node::value(0)]).with_span(span),
        )]);
        let err = compile_unit(tree, &Options::default()).unwrap_err();
        assert_eq!(
            err,
            Error::Fold {
                span,
                message: "division by zero".to_string()
            }
        );
        assert_eq!(err.to_string(), "2:3-2:8: division by zero");
    }

    #[test]
    fn test_unoptimized_division_by_zero_compiles() {
        let tree = Node::block(vec![Node::stack_op(
            Operator::Div,
            vec![Node::value(1), Node::value(0)],
        )]);
        let options = Options::new().with_opt_level(OptLevel::None);
        assert!(compile_unit(tree, &options).is_ok());
    }

    #[test]
    fn test_stray_break_is_rejected() {
        let tree = Node::block(vec![Node::brk()]);
        let err = compile_unit(tree, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::StrayJump { keyword: "break", .. }));
    }
}
