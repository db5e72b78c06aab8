//! Code generation from syntax trees to instruction lists.
//!
//! The `Compiler` walks the tree once and appends instructions to the list
//! of the unit being compiled. Jumps whose destination is not known yet are
//! emitted with a placeholder and patched once the destination is emitted.
//!
//! `break` and `continue` cannot be patched that way because any number of
//! them can appear anywhere inside a loop body. Each loop takes a fresh
//! negative id instead: `continue` jumps to the id and `break` to the id
//! minus one, and once the body is complete every jump in it carrying one of
//! the two ids is rewritten to the real destination.

mod expressions;
mod statements;


use std::ops::Range;
use std::sync::Arc;

use tracing::trace;

use crate::ast::{Node, NodeKind, Span};
use crate::compiler::instruction::{FuncPrototype, InstCode, InstList, Instruction, Operand};
use crate::runtime::value::Value;
use crate::{Error, Result};

/// The part of the compiler state that belongs to one unit.
///
/// A nested function is compiled into a fresh context; the enclosing one is
/// set aside and restored afterwards.
#[derive(Debug, Default)]
pub struct CompilerContext {
    /// Id of the innermost loop or switch, `0` outside of any
    pub loop_id: i64,
    /// The list being built
    pub list: InstList,
}

/// Compiles syntax trees to instruction lists.
#[derive(Debug, Default)]
pub struct Compiler {
    /// The context of the unit being compiled
    pub ctx: CompilerContext,
}

impl Compiler {
    /// Creates a new compiler.
    pub fn new() -> Self {
        Self {
            ctx: CompilerContext::default(),
        }
    }

    /// Compiles a unit.
    ///
    /// Modules end by returning their variable table; any other unit
    /// returns `null` unless it already ends with a `return`.
    pub fn compile(&mut self, tree: &Node, is_module: bool) -> Result<InstList> {
        self.ctx = CompilerContext::default();
        self.compile_unit_body(tree, is_module)?;
        Ok(std::mem::take(&mut self.ctx.list))
    }

    fn compile_unit_body(&mut self, tree: &Node, is_module: bool) -> Result<()> {
        self.compile_node(tree)?;

        if is_module {
            self.emit(InstCode::ReturnVars, tree.span)?;
            return Ok(());
        }

        let len = self.current_len();
        let ends_with_return = self
            .ctx
            .list
            .instructions
            .last()
            .is_some_and(|inst| inst.code == InstCode::ReturnVal);
        let jumps_to_end = self
            .ctx
            .list
            .instructions
            .iter()
            .any(|inst| inst.jump_target() == Some(len));

        if !ends_with_return || jumps_to_end {
            self.push_null(tree.span)?;
            self.emit(InstCode::ReturnVal, tree.span)?;
        }
        Ok(())
    }

    /// Compiles a function body into its own list and pushes the function.
    fn compile_function(&mut self, params: &[Arc<str>], body: &Node, span: Span) -> Result<()> {
        let outer = std::mem::take(&mut self.ctx);
        let result = self.compile_unit_body(body, false);
        let inner = std::mem::replace(&mut self.ctx, outer);
        result?;

        trace!(
            params = params.len(),
            instructions = inner.list.len(),
            "compiled nested function"
        );
        let index = self.ctx.list.add_function(FuncPrototype {
            params: params.to_vec(),
            body: inner.list,
        })?;
        self.emit_with(InstCode::MakeFunc, Operand::Func(index), span)?;
        Ok(())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn compile_node(&mut self, node: &Node) -> Result<()> {
        let span = node.span;
        match &node.kind {
            // Statements
            NodeKind::Block(statements) => self.compile_block(statements),
            NodeKind::While {
                condition,
                body,
                is_do_while: false,
            } => self.compile_while(condition, body, span),
            NodeKind::While {
                condition,
                body,
                is_do_while: true,
            } => self.compile_do_while(condition, body, span),
            NodeKind::For {
                iterator,
                assignment: None,
                body,
            } => self.compile_counted_for(iterator, body, span),
            NodeKind::For {
                iterator,
                assignment: Some(target),
                body,
            } => self.compile_for_as(iterator, target, body, span),
            NodeKind::FuncDecl { name, params, body } => {
                self.compile_function(params, body, span)?;
                self.emit_name(InstCode::SetValLoc, name, span)?;
                Ok(())
            }
            NodeKind::Return(value) => self.compile_return(value.as_deref(), span),
            NodeKind::Continue => self.compile_loop_jump(false, span),
            NodeKind::Break => self.compile_loop_jump(true, span),
            NodeKind::Switch {
                expr,
                cases,
                default,
            } => self.compile_switch(expr, cases, default.as_deref(), span),
            NodeKind::TryCatch {
                try_body,
                catch_body,
                error_name,
            } => self.compile_try_catch(try_body, catch_body, error_name, span),
            NodeKind::StatementWrapper(inner) | NodeKind::ExprWrapper(inner) => {
                self.compile_node(inner)
            }
            NodeKind::NoOp => Ok(()),

            // Expressions
            NodeKind::StackOp { op, values } => self.compile_stack_op(*op, values, span),
            NodeKind::LocalStackOp {
                op,
                values,
                special,
            } => self.compile_local_stack_op(*op, values, special, span),
            NodeKind::LocalOp { op, value } => self.compile_local_op(*op, value, span),
            NodeKind::SeqLit { kind, values } => self.compile_seq_lit(*kind, values, span),
            NodeKind::MapLit { entries } => self.compile_map_lit(entries, span),
            NodeKind::Value(value) => {
                self.emit_const(InstCode::PushVal, value.clone(), span)?;
                Ok(())
            }
            NodeKind::Access(name) => {
                self.emit_name(InstCode::GetVal, name, span)?;
                Ok(())
            }
            NodeKind::Extract { container, key } => {
                self.compile_node(container)?;
                self.compile_node(key)?;
                self.emit(InstCode::Extract, span)?;
                Ok(())
            }
            NodeKind::Assign { target, value } => self.compile_assign(target, value, span),
            NodeKind::CompoundAssign { op, target, values } => {
                self.compile_compound_assign(*op, target, values, span)
            }
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => self.compile_if(condition, then_body, else_body.as_deref(), span),
            NodeKind::Lambda { params, body } => self.compile_function(params, body, span),
        }
    }

    /// Compiles a node in statement position, dropping any value it leaves.
    fn compile_statement(&mut self, node: &Node) -> Result<()> {
        self.compile_node(node)?;
        if node.returns_value() {
            self.emit(InstCode::PopVal, node.span)?;
        }
        Ok(())
    }

    // ========================================================================
    // Loop placeholders
    // ========================================================================

    fn enter_loop(&mut self) -> i64 {
        self.ctx.loop_id -= 2;
        self.ctx.loop_id
    }

    fn leave_loop(&mut self) {
        self.ctx.loop_id += 2;
    }

    /// Rewrites the `continue` and `break` jumps of loop `id` emitted in
    /// `range`.
    fn replace_placeholders(
        &mut self,
        range: Range<usize>,
        id: i64,
        continue_idx: usize,
        break_idx: usize,
    ) {
        self.patch_placeholder(range.clone(), id, continue_idx);
        self.patch_placeholder(range, id - 1, break_idx);
    }

    fn patch_placeholder(&mut self, range: Range<usize>, placeholder: i64, target: usize) {
        let end = range.end.min(self.ctx.list.instructions.len());
        let start = range.start.min(end);
        for inst in &mut self.ctx.list.instructions[start..end] {
            if inst.code.is_jump() && inst.operand == Operand::Jump(placeholder) {
                inst.operand = Operand::Jump(target as i64);
            }
        }
    }

    // ========================================================================
    // Utilities
    // ========================================================================

    fn current_len(&self) -> usize {
        self.ctx.list.len()
    }

    fn emit(&mut self, code: InstCode, span: Span) -> Result<usize> {
        self.ctx.list.emit(Instruction::simple(code, span))
    }

    fn emit_with(&mut self, code: InstCode, operand: Operand, span: Span) -> Result<usize> {
        self.ctx
            .list
            .emit(Instruction::with_operand(code, operand, span))
    }

    fn emit_int(&mut self, code: InstCode, value: i64, span: Span) -> Result<usize> {
        self.emit_with(code, Operand::Int(value), span)
    }

    fn emit_const(&mut self, code: InstCode, value: Value, span: Span) -> Result<usize> {
        let index = self.ctx.list.add_constant(value)?;
        self.emit_with(code, Operand::Const(index), span)
    }

    /// Emits an instruction naming a variable; names share pool entries.
    fn emit_name(&mut self, code: InstCode, name: &Arc<str>, span: Span) -> Result<usize> {
        let index = self
            .ctx
            .list
            .add_constant_dedup(Value::Str(Arc::clone(name)))?;
        self.emit_with(code, Operand::Const(index), span)
    }

    fn push_null(&mut self, span: Span) -> Result<usize> {
        self.emit_const(InstCode::PushVal, Value::Null, span)
    }

    /// Emits a jump whose target is patched later.
    fn emit_placeholder(&mut self, code: InstCode, span: Span) -> Result<usize> {
        self.emit_with(
            code,
            Operand::Jump(0), // Placeholder
            span,
        )
    }

    fn patch_jump(&mut self, index: usize, target: usize) {
        if let Some(inst) = self.ctx.list.instructions.get_mut(index) {
            inst.operand = Operand::Jump(target as i64);
        }
    }

    fn patch_to_here(&mut self, index: usize) {
        let here = self.current_len();
        self.patch_jump(index, here);
    }
}

fn malformed(span: Span, message: &'static str) -> Error {
    Error::Malformed { span, message }
}
