//! Optimizers for syntax trees and instruction lists.
//!
//! # Module Structure
//!
//! - `tree`: constant folding and pruning before lowering
//! - `peephole`: rewrites on instruction lists, run to a fixed point
//! - `builtins`: replacement of built-in names with their values

pub mod builtins;
pub mod peephole;
pub mod tree;

use tracing::{debug, instrument};

use crate::Result;
use crate::ast::Node;
use crate::compiler::InstList;

pub use tree::TreeOptimizer;

/// Folds constants and prunes dead branches of a tree.
#[instrument(skip_all)]
pub fn optimize_tree(tree: Node) -> Result<Node> {
    let mut optimizer = TreeOptimizer::new();
    let tree = optimizer.optimize(tree)?;
    debug!(
        folded = optimizer.folded,
        pruned = optimizer.pruned,
        "optimized syntax tree"
    );
    Ok(tree)
}

/// Optimizes an instruction list and its nested functions.
///
/// Built-in names are substituted only in the list itself and the
/// functions it contains, since the analysis must see every function
/// that could rebind them.
#[instrument(skip(list))]
pub fn optimize_ir(list: &mut InstList, substitute_builtins: bool) -> Result<()> {
    let before = list.len();
    if substitute_builtins {
        let replaced = builtins::substitute(list)?;
        debug!(replaced, "substituted builtin names");
    }
    peephole::optimize(list)?;
    debug!(before, after = list.len(), "optimized instruction list");
    Ok(())
}
