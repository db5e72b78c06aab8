//! Expression lowering.
//!
//! Every expression leaves exactly one value on the stack.
//!
//! ## Stack Operations
//!
//! Operands are combined left to right:
//!
//! ```text
//! a + b + c
//!
//!   [a]
//!   [b]
//!   STACK_OP +
//!   [c]
//!   STACK_OP +
//! ```
//!
//! Comparison chains with more than two operands stop at the first false
//! link and keep its result:
//!
//! ```text
//! a < b < c
//!
//!      [a]
//!      [b]
//!      DUP
//!      ROT_3            ; b a b
//!      STACK_OP <
//!      DUP
//!      JUMPIF_F fix
//!      POP_VAL          ; b
//!      [c]
//!      STACK_OP <
//!      JUMP end
//! fix: ROT_2
//!      POP_VAL
//! end:
//! ```
//!
//! `&&` and `||` short-circuit and evaluate to the last operand evaluated:
//!
//! ```text
//!      [a]
//!      DUP
//!      JUMPIF_F end     ; JUMPIF_T for ||
//!      POP_VAL
//!      [b]
//! end:
//! ```
//!
//! ## If Expression
//!
//! ```text
//!       [condition]
//!       JUMPIF_F else
//!       [then]
//!       JUMP exit
//! else: [else]          ; PUSH_VAL null when there is no else
//! exit:
//! ```
//!
//! A branch that is a statement is followed by `PUSH_VAL null`. When both
//! branches are statements a single `PUSH_VAL null` after `exit` is shared.
//!
//! ## Assignments
//!
//! | Target | Layout |
//! |--------|--------|
//! | `x` | `[value] SET_VAL x` |
//! | `c.k` | `[value] [c] [k] SET_CONT_VAL` |
//! | `{a, {b, c}}` | `[value] DUP UNPACK_SEQ 2 SET_VAL_LOC a UNPACK_SEQ 2 SET_VAL_LOC b SET_VAL_LOC c` |
//!
//! A compound assignment `x += a, b` reads the target first, combines the
//! right side operands and applies the operator once more:
//! `GET_VAL x [a] [b] STACK_OP + STACK_OP + SET_VAL x`.

use super::{Compiler, malformed};
use crate::Result;
use crate::ast::{Node, NodeKind, Operator, SeqKind, Span};
use crate::compiler::instruction::{InstCode, Operand};

impl Compiler {
    pub(super) fn compile_stack_op(&mut self, op: Operator, values: &[Node], span: Span) -> Result<()> {
        let Some((first, rest)) = values.split_first() else {
            return Err(malformed(span, "stack operation without operands"));
        };
        self.compile_node(first)?;

        if rest.is_empty() {
            return Ok(());
        }
        if op.is_comparison() && rest.len() > 1 {
            return self.compile_comparison_chain(op, rest, span);
        }
        if op.is_short_circuit() {
            return self.compile_logical(op, rest, span);
        }

        for value in rest {
            self.compile_node(value)?;
            self.emit_int(InstCode::StackOp, i64::from(op.code()), span)?;
        }
        Ok(())
    }

    /// Compiles the operands after the first of a comparison chain.
    fn compile_comparison_chain(&mut self, op: Operator, rest: &[Node], span: Span) -> Result<()> {
        let Some((last, inner)) = rest.split_last() else {
            return Ok(());
        };
        let code = i64::from(op.code());

        let mut jumps_to_fix = Vec::new();
        for value in inner {
            self.compile_node(value)?;
            self.emit(InstCode::Dup, span)?;
            self.emit(InstCode::Rot3, span)?;
            self.emit_int(InstCode::StackOp, code, span)?;
            self.emit(InstCode::Dup, span)?;
            let jump = self.emit_placeholder(InstCode::JumpIfF, span)?;
            crate::try_push(&mut jumps_to_fix, jump, "comparison chain jumps")?;
            self.emit(InstCode::PopVal, span)?;
        }

        self.compile_node(last)?;
        self.emit_int(InstCode::StackOp, code, span)?;
        let jump_idx = self.current_len();
        self.emit_with(InstCode::Jump, Operand::Jump(jump_idx as i64 + 3), span)?;

        for jump in jumps_to_fix {
            self.patch_to_here(jump);
        }
        self.emit(InstCode::Rot2, span)?;
        self.emit(InstCode::PopVal, span)?;
        Ok(())
    }

    /// Compiles the operands after the first of `&&` and `||`.
    fn compile_logical(&mut self, op: Operator, rest: &[Node], span: Span) -> Result<()> {
        let jump_code = if op == Operator::Or {
            InstCode::JumpIfT
        } else {
            InstCode::JumpIfF
        };

        let mut jumps_to_end = Vec::new();
        for value in rest {
            self.emit(InstCode::Dup, span)?;
            let jump = self.emit_placeholder(jump_code, span)?;
            crate::try_push(&mut jumps_to_end, jump, "logical operator jumps")?;
            self.emit(InstCode::PopVal, span)?;
            self.compile_node(value)?;
        }

        for jump in jumps_to_end {
            self.patch_to_here(jump);
        }
        Ok(())
    }

    pub(super) fn compile_local_stack_op(
        &mut self,
        op: Operator,
        values: &[Node],
        special: &Node,
        span: Span,
    ) -> Result<()> {
        for value in values {
            self.compile_node(value)?;
        }
        self.compile_node(special)?;

        let count = values.len() as i64;
        match op {
            Operator::Range => self.emit_int(InstCode::Range, count + 1, span)?,
            Operator::Cast => self.emit(InstCode::Cast, span)?,
            Operator::Call => self.emit_int(InstCode::Call, count, span)?,
            Operator::SeqCall => self.emit(InstCode::SeqCall, span)?,
            Operator::Throw => self.emit(InstCode::ThrowErr, span)?,
            _ => return Err(malformed(span, "not a local-stack operator")),
        };
        Ok(())
    }

    pub(super) fn compile_local_op(&mut self, op: Operator, value: &Node, span: Span) -> Result<()> {
        self.compile_node(value)?;
        match op {
            Operator::LocCall => self.emit_int(InstCode::Call, 0, span)?,
            Operator::Import => self.emit(InstCode::Import, span)?,
            Operator::Len
            | Operator::Not
            | Operator::BitNot
            | Operator::Stdout
            | Operator::Stdin
            | Operator::Neg
            | Operator::Typeof => self.emit_int(InstCode::LocalOp, i64::from(op.code()), span)?,
            _ => return Err(malformed(span, "not a local operator")),
        };
        Ok(())
    }

    pub(super) fn compile_seq_lit(&mut self, kind: SeqKind, values: &[Node], span: Span) -> Result<()> {
        let count = values.len() as i64;
        let (code, operand) = match kind {
            SeqKind::Array => (InstCode::MakeArr, Operand::Int(count)),
            SeqKind::Vector => (InstCode::MakeVec, Operand::Int(count)),
            SeqKind::ArrayRep => (InstCode::MakeArrRep, Operand::None),
            SeqKind::VectorRep => (InstCode::MakeVecRep, Operand::None),
            SeqKind::AssignmentNames => {
                return Err(malformed(span, "unpacking pattern used as a value"));
            }
        };
        // Repetitions hold the value then the count
        if operand == Operand::None && values.len() != 2 {
            return Err(malformed(span, "repetition literal needs a value and a count"));
        }

        for value in values {
            self.compile_node(value)?;
        }
        self.emit_with(code, operand, span)?;
        Ok(())
    }

    pub(super) fn compile_map_lit(&mut self, entries: &[(Node, Node)], span: Span) -> Result<()> {
        for (key, value) in entries {
            self.compile_node(key)?;
            self.emit(InstCode::HashCheck, key.span)?;
            self.compile_node(value)?;
        }
        self.emit_int(InstCode::MakeMap, entries.len() as i64 * 2, span)?;
        Ok(())
    }

    pub(super) fn compile_if(
        &mut self,
        condition: &Node,
        then_body: &Node,
        else_body: Option<&Node>,
        span: Span,
    ) -> Result<()> {
        self.compile_node(condition)?;
        let jump_to_else = self.emit_placeholder(InstCode::JumpIfF, span)?;
        self.compile_node(then_body)?;

        let Some(else_body) = else_body else {
            let jump_to_exit = if then_body.returns_value() {
                Some(self.emit_placeholder(InstCode::Jump, span)?)
            } else {
                None
            };
            self.patch_to_here(jump_to_else);
            self.push_null(span)?;
            if let Some(jump) = jump_to_exit {
                self.patch_to_here(jump);
            }
            return Ok(());
        };

        let both_statements = !then_body.returns_value() && !else_body.returns_value();
        if !both_statements && !then_body.returns_value() {
            self.push_null(span)?;
        }
        let jump_to_exit = self.emit_placeholder(InstCode::Jump, span)?;
        self.patch_to_here(jump_to_else);

        self.compile_node(else_body)?;
        if !both_statements && !else_body.returns_value() {
            self.push_null(span)?;
        }
        self.patch_to_here(jump_to_exit);
        if both_statements {
            self.push_null(span)?;
        }
        Ok(())
    }

    pub(super) fn compile_assign(&mut self, target: &Node, value: &Node, span: Span) -> Result<()> {
        self.compile_node(value)?;
        if matches!(
            target.kind,
            NodeKind::SeqLit {
                kind: SeqKind::AssignmentNames,
                ..
            }
        ) {
            self.emit(InstCode::Dup, span)?;
            return self.compile_unpacking(target);
        }
        self.compile_store(target, true)
    }

    pub(super) fn compile_compound_assign(
        &mut self,
        op: Operator,
        target: &Node,
        values: &[Node],
        span: Span,
    ) -> Result<()> {
        let Some((first, rest)) = values.split_first() else {
            return Err(malformed(span, "compound assignment without operands"));
        };
        let code = i64::from(op.code());

        self.compile_node(target)?;
        self.compile_node(first)?;
        for value in rest {
            self.compile_node(value)?;
            self.emit_int(InstCode::StackOp, code, span)?;
        }
        self.emit_int(InstCode::StackOp, code, span)?;
        self.compile_store(target, true)
    }

    /// Pops the value on top of the stack into `target`, unpacking nested
    /// patterns.
    pub(super) fn compile_unpacking(&mut self, target: &Node) -> Result<()> {
        let NodeKind::SeqLit {
            kind: SeqKind::AssignmentNames,
            values,
        } = &target.kind
        else {
            return self.compile_store(target, false);
        };

        if values.is_empty() {
            return Err(malformed(target.span, "empty unpacking pattern"));
        }
        self.emit_int(InstCode::UnpackSeq, values.len() as i64, target.span)?;
        for value in values {
            self.compile_unpacking(value)?;
        }
        Ok(())
    }

    /// Stores the value on top of the stack in a variable or container
    /// slot, keeping it on the stack if `keep` is set.
    fn compile_store(&mut self, target: &Node, keep: bool) -> Result<()> {
        match &target.kind {
            NodeKind::Access(name) => {
                let code = if keep {
                    InstCode::SetVal
                } else {
                    InstCode::SetValLoc
                };
                self.emit_name(code, name, target.span)?;
            }
            NodeKind::Extract { container, key } => {
                self.compile_node(container)?;
                self.compile_node(key)?;
                let code = if keep {
                    InstCode::SetContVal
                } else {
                    InstCode::SetContLoc
                };
                self.emit(code, target.span)?;
            }
            NodeKind::ExprWrapper(inner) => return self.compile_store(inner, keep),
            _ => return Err(malformed(target.span, "invalid assignment target")),
        }
        Ok(())
    }
}
