//! Constant folding and dead branch pruning on the syntax tree.
//!
//! The tree is consumed and rebuilt bottom-up, so every rule sees children
//! that are already folded. The rules are:
//!
//! - a run of literal operands at the start of a stack operation is
//!   evaluated and replaced by its result; folding stops at the first
//!   operand that is not a literal
//! - a comparison chain is evaluated only when every operand is a literal
//! - unary operations on literals are evaluated
//! - `while` loops with a falsy literal condition disappear, `do-while`
//!   loops with one run their body once, counted loops with a zero count
//!   disappear
//! - literals and plain variable reads used as statements are dropped
//! - an `if` with a literal condition becomes the taken branch when that
//!   branch produces a value
//!
//! Evaluation errors are compile errors: a program that divides by a zero
//! literal is rejected instead of failing when it runs.

use tracing::trace;

use crate::ast::{Node, NodeKind, Operator, Span, SwitchCase};
use crate::runtime::ops::{self, OpError};
use crate::runtime::value::Value;
use crate::{Error, Result};

/// Rewrites a tree, counting what changed.
#[derive(Debug, Default)]
pub struct TreeOptimizer {
    /// Operations evaluated ahead of time
    pub folded: usize,
    /// Loops, branches and statements removed
    pub pruned: usize,
}

impl TreeOptimizer {
    /// Creates a new optimizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimizes `node` and everything below it.
    pub fn optimize(&mut self, node: Node) -> Result<Node> {
        let Node { kind, span } = node;

        let kind = match kind {
            NodeKind::Block(statements) => NodeKind::Block(self.optimize_block(statements)?),
            NodeKind::While {
                condition,
                body,
                is_do_while,
            } => {
                let condition = self.optimize(*condition)?;
                let body = self.optimize(*body)?;
                return Ok(self.prune_while(condition, body, is_do_while, span));
            }
            NodeKind::For {
                iterator,
                assignment,
                body,
            } => {
                let iterator = self.optimize(*iterator)?;
                let assignment = assignment.map(|a| self.optimize_boxed(a)).transpose()?;
                if assignment.is_none() && iterator.as_literal() == Some(&Value::Int(0)) {
                    self.pruned += 1;
                    trace!(%span, "removed loop with zero repetitions");
                    return Ok(Node::new(NodeKind::NoOp, span));
                }
                NodeKind::For {
                    iterator: Box::new(iterator),
                    assignment,
                    body: self.optimize_boxed(body)?,
                }
            }
            NodeKind::FuncDecl { name, params, body } => NodeKind::FuncDecl {
                name,
                params,
                body: self.optimize_boxed(body)?,
            },
            NodeKind::Lambda { params, body } => NodeKind::Lambda {
                params,
                body: self.optimize_boxed(body)?,
            },
            NodeKind::Return(value) => {
                NodeKind::Return(value.map(|v| self.optimize_boxed(v)).transpose()?)
            }
            NodeKind::Switch {
                expr,
                cases,
                default,
            } => NodeKind::Switch {
                expr: self.optimize_boxed(expr)?,
                cases: cases
                    .into_iter()
                    .map(|case| -> Result<SwitchCase> {
                        Ok(SwitchCase {
                            value: self.optimize(case.value)?,
                            body: self.optimize(case.body)?,
                        })
                    })
                    .collect::<Result<_>>()?,
                default: default.map(|d| self.optimize_boxed(d)).transpose()?,
            },
            NodeKind::TryCatch {
                try_body,
                catch_body,
                error_name,
            } => NodeKind::TryCatch {
                try_body: self.optimize_boxed(try_body)?,
                catch_body: self.optimize_boxed(catch_body)?,
                error_name,
            },
            NodeKind::StatementWrapper(inner) => {
                NodeKind::StatementWrapper(self.optimize_boxed(inner)?)
            }
            NodeKind::ExprWrapper(inner) => {
                let inner = self.optimize(*inner)?;
                // Unwrapped so that the enclosing operation can fold it
                if inner.is_literal() {
                    return Ok(inner.with_span(span));
                }
                NodeKind::ExprWrapper(Box::new(inner))
            }

            NodeKind::StackOp { op, values } => {
                let values = self.optimize_all(values)?;
                return self.fold_stack_op(op, values, span);
            }
            NodeKind::LocalOp { op, value } => {
                let value = self.optimize(*value)?;
                if ops::is_foldable(op) {
                    if let Some(literal) = value.as_literal() {
                        let result = ops::local_op(op, literal).map_err(|e| fold_error(span, e))?;
                        self.folded += 1;
                        trace!(%span, %op, "folded local operation");
                        return Ok(Node::new(NodeKind::Value(result), span));
                    }
                }
                NodeKind::LocalOp {
                    op,
                    value: Box::new(value),
                }
            }
            NodeKind::LocalStackOp {
                op,
                values,
                special,
            } => NodeKind::LocalStackOp {
                op,
                values: self.optimize_all(values)?,
                special: self.optimize_boxed(special)?,
            },
            NodeKind::SeqLit { kind, values } => NodeKind::SeqLit {
                kind,
                values: self.optimize_all(values)?,
            },
            NodeKind::MapLit { entries } => NodeKind::MapLit {
                entries: entries
                    .into_iter()
                    .map(|(key, value)| -> Result<(Node, Node)> {
                        Ok((self.optimize(key)?, self.optimize(value)?))
                    })
                    .collect::<Result<_>>()?,
            },
            NodeKind::Extract { container, key } => NodeKind::Extract {
                container: self.optimize_boxed(container)?,
                key: self.optimize_boxed(key)?,
            },
            NodeKind::Assign { target, value } => NodeKind::Assign {
                target: self.optimize_boxed(target)?,
                value: self.optimize_boxed(value)?,
            },
            NodeKind::CompoundAssign { op, target, values } => NodeKind::CompoundAssign {
                op,
                target: self.optimize_boxed(target)?,
                values: self.optimize_all(values)?,
            },
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.optimize(*condition)?;
                let then_body = self.optimize(*then_body)?;
                let else_body = else_body.map(|e| self.optimize(*e)).transpose()?;
                return Ok(self.prune_if(condition, then_body, else_body, span));
            }

            kind @ (NodeKind::Value(_)
            | NodeKind::Access(_)
            | NodeKind::Continue
            | NodeKind::Break
            | NodeKind::NoOp) => kind,
        };

        Ok(Node::new(kind, span))
    }

    fn optimize_boxed(&mut self, node: Box<Node>) -> Result<Box<Node>> {
        Ok(Box::new(self.optimize(*node)?))
    }

    fn optimize_all(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        nodes.into_iter().map(|node| self.optimize(node)).collect()
    }

    fn optimize_block(&mut self, statements: Vec<Node>) -> Result<Vec<Node>> {
        let mut kept = Vec::new();
        kept.try_reserve(statements.len())
            .map_err(|_| Error::Allocation { what: "block" })?;

        for statement in statements {
            let statement = self.optimize(statement)?;
            // Their value would only be popped
            if matches!(statement.kind, NodeKind::Value(_) | NodeKind::Access(_)) {
                self.pruned += 1;
                continue;
            }
            kept.push(statement);
        }
        Ok(kept)
    }

    fn fold_stack_op(&mut self, op: Operator, mut values: Vec<Node>, span: Span) -> Result<Node> {
        if values.len() == 1 {
            if let Some(only) = values.pop() {
                return Ok(only);
            }
        }

        if op.is_comparison() {
            return self.fold_comparison(op, values, span);
        }
        if !ops::is_foldable(op) {
            return Ok(Node::new(NodeKind::StackOp { op, values }, span));
        }

        let prefix = values.iter().take_while(|value| value.is_literal()).count();
        if prefix < 2 {
            return Ok(Node::new(NodeKind::StackOp { op, values }, span));
        }

        let literals: Vec<Value> = values
            .drain(..prefix)
            .filter_map(|node| match node.kind {
                NodeKind::Value(value) => Some(value),
                _ => None,
            })
            .collect();
        let mut literals = literals.into_iter();
        let Some(mut result) = literals.next() else {
            return Ok(Node::new(NodeKind::StackOp { op, values }, span));
        };
        for operand in literals {
            result = ops::stack_op(op, &result, &operand).map_err(|e| fold_error(span, e))?;
        }
        self.folded += prefix - 1;
        trace!(%span, %op, operands = prefix, "folded stack operation");

        let folded = Node::new(NodeKind::Value(result), span);
        if values.is_empty() {
            return Ok(folded);
        }
        values.insert(0, folded);
        Ok(Node::new(NodeKind::StackOp { op, values }, span))
    }

    fn fold_comparison(&mut self, op: Operator, values: Vec<Node>, span: Span) -> Result<Node> {
        let literals: Option<Vec<&Value>> = values.iter().map(Node::as_literal).collect();
        let Some(literals) = literals else {
            return Ok(Node::new(NodeKind::StackOp { op, values }, span));
        };

        let mut result = Value::Bool(true);
        for pair in literals.windows(2) {
            result = ops::stack_op(op, pair[0], pair[1]).map_err(|e| fold_error(span, e))?;
            if result == Value::Bool(false) {
                break;
            }
        }
        self.folded += 1;
        trace!(%span, %op, "folded comparison");
        Ok(Node::new(NodeKind::Value(result), span))
    }

    fn prune_while(&mut self, condition: Node, body: Node, is_do_while: bool, span: Span) -> Node {
        let never_repeats = condition.as_literal().is_some_and(|c| !c.is_truthy());
        if never_repeats && !is_do_while {
            self.pruned += 1;
            trace!(%span, "removed loop that never runs");
            return Node::new(NodeKind::NoOp, span);
        }
        // A jump out of the body needs the loop to land on
        if never_repeats && !has_loop_jump(&body) {
            self.pruned += 1;
            trace!(%span, "unrolled loop that runs once");
            return Node::new(NodeKind::Block(vec![body]), span);
        }

        Node::new(
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
                is_do_while,
            },
            span,
        )
    }

    fn prune_if(&mut self, condition: Node, then_body: Node, else_body: Option<Node>, span: Span) -> Node {
        if let Some(literal) = condition.as_literal() {
            let truthy = literal.is_truthy();
            let taken_returns_value = if truthy {
                then_body.returns_value()
            } else {
                else_body.as_ref().is_none_or(Node::returns_value)
            };
            if taken_returns_value {
                self.pruned += 1;
                trace!(%span, "removed branch with constant condition");
                if truthy {
                    return then_body;
                }
                return else_body.unwrap_or_else(|| Node::new(NodeKind::Value(Value::Null), span));
            }
        }

        Node::new(
            NodeKind::If {
                condition: Box::new(condition),
                then_body: Box::new(then_body),
                else_body: else_body.map(Box::new),
            },
            span,
        )
    }
}

fn fold_error(span: Span, error: OpError) -> Error {
    Error::Fold {
        span,
        message: error.to_string(),
    }
}

/// Returns true if `node` contains a `break` or `continue` bound to the
/// loop directly around it.
fn has_loop_jump(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Break | NodeKind::Continue => true,

        // Bodies of these bind their own jumps
        NodeKind::While { condition, .. } => has_loop_jump(condition),
        NodeKind::For { iterator, .. } => has_loop_jump(iterator),
        NodeKind::Switch { expr, cases, .. } => {
            has_loop_jump(expr) || cases.iter().any(|case| has_loop_jump(&case.value))
        }
        NodeKind::FuncDecl { .. } | NodeKind::Lambda { .. } => false,

        NodeKind::Block(nodes) | NodeKind::StackOp { values: nodes, .. } | NodeKind::SeqLit { values: nodes, .. } => {
            nodes.iter().any(has_loop_jump)
        }
        NodeKind::Return(value) => value.as_deref().is_some_and(has_loop_jump),
        NodeKind::TryCatch {
            try_body,
            catch_body,
            ..
        } => has_loop_jump(try_body) || has_loop_jump(catch_body),
        NodeKind::StatementWrapper(inner)
        | NodeKind::ExprWrapper(inner)
        | NodeKind::LocalOp { value: inner, .. } => has_loop_jump(inner),
        NodeKind::LocalStackOp { values, special, .. } => {
            values.iter().any(has_loop_jump) || has_loop_jump(special)
        }
        NodeKind::MapLit { entries } => entries
            .iter()
            .any(|(key, value)| has_loop_jump(key) || has_loop_jump(value)),
        NodeKind::Extract { container, key } => has_loop_jump(container) || has_loop_jump(key),
        NodeKind::Assign { target, value } => has_loop_jump(target) || has_loop_jump(value),
        NodeKind::CompoundAssign { target, values, .. } => {
            has_loop_jump(target) || values.iter().any(has_loop_jump)
        }
        NodeKind::If {
            condition,
            then_body,
            else_body,
        } => {
            has_loop_jump(condition)
                || has_loop_jump(then_body)
                || else_body.as_deref().is_some_and(has_loop_jump)
        }
        NodeKind::Value(_) | NodeKind::Access(_) | NodeKind::NoOp => false,
    }
}
