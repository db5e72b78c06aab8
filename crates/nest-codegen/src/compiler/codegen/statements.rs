//! Statement lowering.
//!
//! Statements never leave a value on the stack. The layouts below use
//! labels for jump destinations; `id` is the loop placeholder described in
//! the parent module.
//!
//! ## While Loop
//!
//! ```text
//! cond: [condition]
//!       JUMPIF_F exit
//!       [body]              ; continue -> cond, break -> exit
//!       JUMP cond
//! exit:
//! ```
//!
//! ## Do-While Loop
//!
//! ```text
//! body: [body]              ; continue -> cond, break -> exit
//! cond: [condition]
//!       JUMPIF_T body
//! exit:
//! ```
//!
//! ## Counted For Loop
//!
//! ```text
//!       [count]
//!       TYPE_CHECK Int
//!       NEW_INT
//! cond: JUMPIF_ZERO exit
//!       [body]              ; continue -> cont, break -> exit
//! cont: DEC_INT
//!       JUMP cond
//! exit: POP_VAL
//! ```
//!
//! ## Iterator For Loop
//!
//! ```text
//!       [iterable]
//!       FOR_START
//! cond: FOR_IS_DONE
//!       JUMPIF_T exit
//!       FOR_GET_VAL
//!       [local store of the target]
//!       [body]              ; continue -> cont, break -> exit
//! cont: FOR_ADVANCE
//!       JUMP cond
//! exit: POP_VAL
//! ```
//!
//! ## Switch
//!
//! ```text
//!        [expression]
//!        DUP               -+
//!        [case value]       | break/continue -> enclosing loop
//!        STACK_OP ==        | for every case
//!        JUMPIF_F next      |
//!        [case body]        | continue -> next case body
//!        JUMP exit          |
//! next:                    -+
//!        [default body]     ; continue -> exit
//! exit:  POP_VAL            ; break -> exit
//! ```
//!
//! ## Try-Catch
//!
//! ```text
//!        PUSH_CATCH catch
//!        [try body]
//!        POP_CATCH
//!        JUMP end
//! catch: SAVE_ERROR
//!        POP_CATCH
//!        SET_VAL_LOC name
//!        [catch body]
//! end:
//! ```

use std::ops::Range;
use std::sync::Arc;

use super::{Compiler, malformed};
use crate::ast::{Node, Operator, Span, SwitchCase};
use crate::compiler::instruction::{InstCode, Operand};
use crate::runtime::value::{Type, Value};
use crate::{Error, Result};

impl Compiler {
    pub(super) fn compile_block(&mut self, statements: &[Node]) -> Result<()> {
        for statement in statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    pub(super) fn compile_while(&mut self, condition: &Node, body: &Node, span: Span) -> Result<()> {
        let cond_idx = self.current_len();
        self.compile_node(condition)?;
        let jump_to_exit = self.emit_placeholder(InstCode::JumpIfF, span)?;

        let id = self.enter_loop();
        let body_start = self.current_len();
        self.compile_statement(body)?;
        let body_end = self.current_len();
        self.leave_loop();

        self.emit_with(InstCode::Jump, Operand::Jump(cond_idx as i64), span)?;
        let exit_idx = self.current_len();
        self.patch_jump(jump_to_exit, exit_idx);
        self.replace_placeholders(body_start..body_end, id, cond_idx, exit_idx);
        Ok(())
    }

    pub(super) fn compile_do_while(
        &mut self,
        condition: &Node,
        body: &Node,
        span: Span,
    ) -> Result<()> {
        let id = self.enter_loop();
        let body_start = self.current_len();
        self.compile_statement(body)?;
        let body_end = self.current_len();
        self.leave_loop();

        // The condition belongs to the enclosing loop, if any
        self.compile_node(condition)?;
        self.emit_with(InstCode::JumpIfT, Operand::Jump(body_start as i64), span)?;
        let exit_idx = self.current_len();
        self.replace_placeholders(body_start..body_end, id, body_end, exit_idx);
        Ok(())
    }

    pub(super) fn compile_counted_for(&mut self, count: &Node, body: &Node, span: Span) -> Result<()> {
        self.compile_node(count)?;
        self.emit_const(InstCode::TypeCheck, Value::Type(Type::Int), count.span)?;
        self.emit(InstCode::NewInt, count.span)?;

        let cond_idx = self.current_len();
        let jump_to_exit = self.emit_placeholder(InstCode::JumpIfZero, span)?;

        let id = self.enter_loop();
        let body_start = self.current_len();
        self.compile_statement(body)?;
        let body_end = self.current_len();
        self.leave_loop();

        let continue_idx = self.current_len();
        self.emit(InstCode::DecInt, span)?;
        self.emit_with(InstCode::Jump, Operand::Jump(cond_idx as i64), span)?;
        let exit_idx = self.current_len();
        self.emit(InstCode::PopVal, span)?;

        self.patch_jump(jump_to_exit, exit_idx);
        self.replace_placeholders(body_start..body_end, id, continue_idx, exit_idx);
        Ok(())
    }

    pub(super) fn compile_for_as(
        &mut self,
        iterable: &Node,
        target: &Node,
        body: &Node,
        span: Span,
    ) -> Result<()> {
        self.compile_node(iterable)?;
        self.emit(InstCode::ForStart, iterable.span)?;

        let cond_idx = self.current_len();
        self.emit(InstCode::ForIsDone, iterable.span)?;
        let jump_to_exit = self.emit_placeholder(InstCode::JumpIfT, span)?;
        self.emit(InstCode::ForGetVal, iterable.span)?;
        self.compile_unpacking(target)?;

        let id = self.enter_loop();
        let body_start = self.current_len();
        self.compile_statement(body)?;
        let body_end = self.current_len();
        self.leave_loop();

        let continue_idx = self.current_len();
        self.emit(InstCode::ForAdvance, span)?;
        self.emit_with(InstCode::Jump, Operand::Jump(cond_idx as i64), span)?;
        let exit_idx = self.current_len();
        self.emit(InstCode::PopVal, span)?;

        self.patch_jump(jump_to_exit, exit_idx);
        self.replace_placeholders(body_start..body_end, id, continue_idx, exit_idx);
        Ok(())
    }

    pub(super) fn compile_return(&mut self, value: Option<&Node>, span: Span) -> Result<()> {
        match value {
            Some(value) if value.returns_value() => self.compile_node(value)?,
            Some(_) => return Err(malformed(span, "a statement cannot be returned")),
            None => {
                self.push_null(span)?;
            }
        }
        self.emit(InstCode::ReturnVal, span)?;
        Ok(())
    }

    /// Emits the placeholder jump of a `break` or `continue`.
    pub(super) fn compile_loop_jump(&mut self, is_break: bool, span: Span) -> Result<()> {
        let id = self.ctx.loop_id;
        if id == 0 {
            return Err(Error::StrayJump {
                span,
                keyword: if is_break { "break" } else { "continue" },
            });
        }
        let placeholder = if is_break { id - 1 } else { id };
        self.emit_with(InstCode::Jump, Operand::Jump(placeholder), span)?;
        Ok(())
    }

    pub(super) fn compile_switch(
        &mut self,
        expr: &Node,
        cases: &[SwitchCase],
        default: Option<&Node>,
        span: Span,
    ) -> Result<()> {
        self.compile_node(expr)?;

        // Case values belong to the enclosing loop, only the bodies see the
        // switch's own id
        let id = self.ctx.loop_id - 2;
        let switch_start = self.current_len();
        let mut jumps_to_exit = Vec::new();
        let mut prev_body: Option<Range<usize>> = None;

        for case in cases {
            let value_span = case.value.span;
            self.emit(InstCode::Dup, value_span)?;
            self.compile_node(&case.value)?;
            self.emit_int(InstCode::StackOp, i64::from(Operator::Eq.code()), value_span)?;
            let jump_to_next = self.emit_placeholder(InstCode::JumpIfF, value_span)?;

            // `continue` in the previous body falls through to this one
            let body_start = self.current_len();
            if let Some(range) = prev_body.take() {
                self.patch_placeholder(range, id, body_start);
            }
            self.compile_switch_body(&case.body)?;
            prev_body = Some(body_start..self.current_len());

            let jump_to_exit = self.emit_placeholder(InstCode::Jump, case.body.span)?;
            crate::try_push(&mut jumps_to_exit, jump_to_exit, "switch exits")?;
            self.patch_to_here(jump_to_next);
        }

        if let Some(default) = default {
            let body_start = self.current_len();
            if let Some(range) = prev_body.take() {
                self.patch_placeholder(range, id, body_start);
            }
            self.compile_switch_body(default)?;
            prev_body = Some(body_start..self.current_len());
        }

        let exit_idx = self.current_len();
        if let Some(range) = prev_body {
            self.patch_placeholder(range, id, exit_idx);
        }
        for jump in jumps_to_exit {
            self.patch_jump(jump, exit_idx);
        }
        self.patch_placeholder(switch_start..exit_idx, id - 1, exit_idx);
        self.emit(InstCode::PopVal, span)?;
        Ok(())
    }

    fn compile_switch_body(&mut self, body: &Node) -> Result<()> {
        self.enter_loop();
        let compiled = self.compile_statement(body);
        self.leave_loop();
        compiled
    }

    pub(super) fn compile_try_catch(
        &mut self,
        try_body: &Node,
        catch_body: &Node,
        error_name: &Arc<str>,
        span: Span,
    ) -> Result<()> {
        let push_catch = self.emit_placeholder(InstCode::PushCatch, span)?;
        self.compile_statement(try_body)?;
        self.emit(InstCode::PopCatch, span)?;
        let jump_to_end = self.emit_placeholder(InstCode::Jump, span)?;

        self.patch_to_here(push_catch);
        self.emit(InstCode::SaveError, span)?;
        self.emit(InstCode::PopCatch, span)?;
        self.emit_name(InstCode::SetValLoc, error_name, span)?;
        self.compile_statement(catch_body)?;
        self.patch_to_here(jump_to_end);
        Ok(())
    }
}
