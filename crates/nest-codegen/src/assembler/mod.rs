//! Assembly of instruction lists into bytecode.
//!
//! Bytecode is a flat array of 16-bit words, each holding an opcode in the
//! high byte and an argument byte in the low byte. Arguments that do not fit
//! in a byte are preceded by up to three `EXTEND_ARG` words carrying the
//! higher bytes, most significant first:
//!
//! ```text
//! PUSH_VAL 0x0102_0304
//!
//!   EXTEND_ARG 0x01
//!   EXTEND_ARG 0x02
//!   EXTEND_ARG 0x03
//!   PUSH_VAL   0x04
//! ```
//!
//! Jump arguments are word offsets, so the width of a jump depends on where
//! its target ends up, which in turn depends on the width of every jump
//! before it. Widths start at one word and grow until every jump fits.
//!
//! Nested functions are assembled on their own and appended to the
//! constant pool after the list's constants; `MAKE_FUNC k` becomes
//! `MAKE_FUNC k + constants`.

pub mod disasm;

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::ast::Span;
use crate::compiler::instruction::{InstCode, InstList, Instruction, Operand};
use crate::runtime::function::Function;
use crate::runtime::value::Value;
use crate::{Error, Result};

/// Bytecode operation codes.
///
/// The discriminant is the high byte of a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // Stack operations
    /// Pop the top value
    PopVal,
    /// Replace the top value with an iterator over it
    ForStart,
    /// Push whether the iterator on top of the stack is exhausted
    ForIsDone,
    /// Push the current item of the iterator on top of the stack
    ForGetVal,
    /// Advance the iterator on top of the stack
    ForAdvance,
    /// Return the top value
    ReturnVal,
    /// Return the variable table
    ReturnVars,
    /// Pop a value and store it in a variable
    SetValLoc,
    /// Pop a key, a container and a value and store the value
    SetContLoc,
    /// Pop a message and raise it
    ThrowErr,
    /// Remove the innermost error handler
    PopCatch,
    /// Store the top value in a variable, keeping it
    SetVal,
    /// Push the value of a variable
    GetVal,
    /// Push a constant
    PushVal,
    /// Store a value in a container, keeping the value
    SetContVal,
    /// Call a function with a number of arguments
    Call,
    /// Call a function with the items of a sequence
    SeqCall,
    /// Cast a value to a type
    Cast,
    /// Build a range from 2 or 3 values
    Range,
    /// Apply a binary operator
    StackOp,
    /// Apply a unary operator
    LocalOp,
    /// Import a module
    Import,
    /// Index a container
    Extract,
    /// Decrement the loop counter on top of the stack
    DecInt,
    /// Replace the top integer with a fresh loop counter
    NewInt,
    /// Duplicate the top value
    Dup,
    /// Swap the two top values
    Rot2,
    /// Move the top value below the next two
    Rot3,
    /// Build an array from a number of values
    MakeArr,
    /// Build an array repeating a value
    MakeArrRep,
    /// Build a vector from a number of values
    MakeVec,
    /// Build a vector repeating a value
    MakeVecRep,
    /// Build a map from a number of keys and values
    MakeMap,
    /// Push a function from the constant pool
    MakeFunc,
    /// Push the error being handled
    SaveError,
    /// Replace a sequence with its items, first item on top
    UnpackSeq,
    /// Check that the top value has a type
    TypeCheck,
    /// Check that the top value is hashable
    HashCheck,
    /// Prefix the argument of the next word with a higher byte
    ExtendArg,

    // Jumps
    /// Unconditional jump
    Jump,
    /// Pop a value and jump if it is truthy
    JumpIfT,
    /// Pop a value and jump if it is falsy
    JumpIfF,
    /// Jump if the loop counter on top of the stack is zero
    JumpIfZero,
    /// Install an error handler at the target
    PushCatch,
}

impl OpCode {
    const ALL: [OpCode; 44] = [
        OpCode::PopVal,
        OpCode::ForStart,
        OpCode::ForIsDone,
        OpCode::ForGetVal,
        OpCode::ForAdvance,
        OpCode::ReturnVal,
        OpCode::ReturnVars,
        OpCode::SetValLoc,
        OpCode::SetContLoc,
        OpCode::ThrowErr,
        OpCode::PopCatch,
        OpCode::SetVal,
        OpCode::GetVal,
        OpCode::PushVal,
        OpCode::SetContVal,
        OpCode::Call,
        OpCode::SeqCall,
        OpCode::Cast,
        OpCode::Range,
        OpCode::StackOp,
        OpCode::LocalOp,
        OpCode::Import,
        OpCode::Extract,
        OpCode::DecInt,
        OpCode::NewInt,
        OpCode::Dup,
        OpCode::Rot2,
        OpCode::Rot3,
        OpCode::MakeArr,
        OpCode::MakeArrRep,
        OpCode::MakeVec,
        OpCode::MakeVecRep,
        OpCode::MakeMap,
        OpCode::MakeFunc,
        OpCode::SaveError,
        OpCode::UnpackSeq,
        OpCode::TypeCheck,
        OpCode::HashCheck,
        OpCode::ExtendArg,
        OpCode::Jump,
        OpCode::JumpIfT,
        OpCode::JumpIfF,
        OpCode::JumpIfZero,
        OpCode::PushCatch,
    ];

    /// Looks an opcode up by the high byte of a word.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// Returns the opcode an IR instruction assembles to; `NoOp` has none.
    pub fn from_inst(code: InstCode) -> Option<OpCode> {
        let op = match code {
            InstCode::NoOp => return None,
            InstCode::PopVal => OpCode::PopVal,
            InstCode::ForStart => OpCode::ForStart,
            InstCode::ForIsDone => OpCode::ForIsDone,
            InstCode::ForGetVal => OpCode::ForGetVal,
            InstCode::ForAdvance => OpCode::ForAdvance,
            InstCode::ReturnVal => OpCode::ReturnVal,
            InstCode::ReturnVars => OpCode::ReturnVars,
            InstCode::SetValLoc => OpCode::SetValLoc,
            InstCode::SetContLoc => OpCode::SetContLoc,
            InstCode::ThrowErr => OpCode::ThrowErr,
            InstCode::PopCatch => OpCode::PopCatch,
            InstCode::SetVal => OpCode::SetVal,
            InstCode::GetVal => OpCode::GetVal,
            InstCode::PushVal => OpCode::PushVal,
            InstCode::SetContVal => OpCode::SetContVal,
            InstCode::Call => OpCode::Call,
            InstCode::SeqCall => OpCode::SeqCall,
            InstCode::Cast => OpCode::Cast,
            InstCode::Range => OpCode::Range,
            InstCode::StackOp => OpCode::StackOp,
            InstCode::LocalOp => OpCode::LocalOp,
            InstCode::Import => OpCode::Import,
            InstCode::Extract => OpCode::Extract,
            InstCode::DecInt => OpCode::DecInt,
            InstCode::NewInt => OpCode::NewInt,
            InstCode::Dup => OpCode::Dup,
            InstCode::Rot2 => OpCode::Rot2,
            InstCode::Rot3 => OpCode::Rot3,
            InstCode::MakeArr => OpCode::MakeArr,
            InstCode::MakeArrRep => OpCode::MakeArrRep,
            InstCode::MakeVec => OpCode::MakeVec,
            InstCode::MakeVecRep => OpCode::MakeVecRep,
            InstCode::MakeMap => OpCode::MakeMap,
            InstCode::MakeFunc => OpCode::MakeFunc,
            InstCode::SaveError => OpCode::SaveError,
            InstCode::UnpackSeq => OpCode::UnpackSeq,
            InstCode::TypeCheck => OpCode::TypeCheck,
            InstCode::HashCheck => OpCode::HashCheck,
            InstCode::Jump => OpCode::Jump,
            InstCode::JumpIfT => OpCode::JumpIfT,
            InstCode::JumpIfF => OpCode::JumpIfF,
            InstCode::JumpIfZero => OpCode::JumpIfZero,
            InstCode::PushCatch => OpCode::PushCatch,
        };
        Some(op)
    }

    /// Returns true if the argument is a word offset.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpIfT
                | OpCode::JumpIfF
                | OpCode::JumpIfZero
                | OpCode::PushCatch
        )
    }

    /// Returns the short name used in disassembly.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::PopVal => "pop",
            OpCode::ForStart => "istart",
            OpCode::ForIsDone => "iend",
            OpCode::ForGetVal => "iget",
            OpCode::ForAdvance => "inext",
            OpCode::ReturnVal => "ret",
            OpCode::ReturnVars => "retvar",
            OpCode::SetValLoc => "setpop",
            OpCode::SetContLoc => "setcpop",
            OpCode::ThrowErr => "throw",
            OpCode::PopCatch => "poptry",
            OpCode::SetVal => "set",
            OpCode::GetVal => "get",
            OpCode::PushVal => "push",
            OpCode::SetContVal => "setc",
            OpCode::Call => "call",
            OpCode::SeqCall => "callseq",
            OpCode::Cast => "cast",
            OpCode::Range => "range",
            OpCode::StackOp => "binop",
            OpCode::LocalOp => "uniop",
            OpCode::Import => "import",
            OpCode::Extract => "extract",
            OpCode::DecInt => "dec",
            OpCode::NewInt => "dupint",
            OpCode::Dup => "dup",
            OpCode::Rot2 => "rot2",
            OpCode::Rot3 => "rot3",
            OpCode::MakeArr => "mkarr",
            OpCode::MakeArrRep => "fillarr",
            OpCode::MakeVec => "mkvec",
            OpCode::MakeVecRep => "fillvec",
            OpCode::MakeMap => "mkmap",
            OpCode::MakeFunc => "mkfunc",
            OpCode::SaveError => "geterr",
            OpCode::UnpackSeq => "unpack",
            OpCode::TypeCheck => "typechk",
            OpCode::HashCheck => "hashchk",
            OpCode::ExtendArg => "extend",
            OpCode::Jump => "jmp",
            OpCode::JumpIfT => "jmptrue",
            OpCode::JumpIfF => "jmpflse",
            OpCode::JumpIfZero => "jmpzero",
            OpCode::PushCatch => "pushtry",
        }
    }
}

/// Packs an opcode and an argument byte into a word.
pub fn pack(op: OpCode, arg: u8) -> u16 {
    (u16::from(op as u8) << 8) | u16::from(arg)
}

/// Splits a word into its opcode byte and argument byte.
pub fn unpack(word: u16) -> (u8, u8) {
    ((word >> 8) as u8, (word & 0xff) as u8)
}

/// Number of `EXTEND_ARG` words needed in front of `arg`.
pub fn val_size(arg: usize) -> u8 {
    u8::from(arg > 0xff_ffff) + u8::from(arg > 0xffff) + u8::from(arg > 0xff)
}

/// Assembled code for one unit or function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    /// The packed words
    pub words: Vec<u16>,
    /// The span of every word, parallel to `words`
    pub spans: Vec<Span>,
    /// The constant pool, nested functions last
    pub constants: Vec<Value>,
}

/// One decoded operation, extension words included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedOp {
    /// The operation
    pub op: OpCode,
    /// The full argument
    pub arg: u32,
    /// Offset of the word after the operation
    pub next: usize,
}

impl Bytecode {
    /// Creates an empty bytecode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns true if there are no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Decodes the operation starting at `offset`, folding any
    /// `EXTEND_ARG` prefixes into its argument.
    ///
    /// Returns `None` past the end or on an unknown opcode.
    pub fn decode_at(&self, offset: usize) -> Option<DecodedOp> {
        let mut arg: u32 = 0;
        let mut pos = offset;
        loop {
            let (code, byte) = unpack(*self.words.get(pos)?);
            let op = OpCode::from_u8(code)?;
            arg = (arg << 8) | u32::from(byte);
            pos += 1;
            if op != OpCode::ExtendArg {
                return Some(DecodedOp { op, arg, next: pos });
            }
        }
    }

    fn push_word(&mut self, word: u16, span: Span) {
        self.words.push(word);
        self.spans.push(span);
    }

    /// Emits an operation preceded by `ext` extension words.
    fn push_op(&mut self, op: OpCode, arg: u32, ext: u8, span: Span) {
        for shift in (1..=u32::from(ext)).rev() {
            self.push_word(pack(OpCode::ExtendArg, (arg >> (8 * shift)) as u8), span);
        }
        self.push_word(pack(op, arg as u8), span);
    }
}

/// Word offsets and widths of the instructions of a list.
#[derive(Debug)]
struct Layout {
    /// Start offset of every instruction, plus the end of the list
    offsets: Vec<usize>,
    /// Extension words of every instruction
    ext: Vec<u8>,
    /// Arguments of the non-jump instructions
    args: Vec<u32>,
    /// Sweeps over the jumps until every destination fit
    sweeps: usize,
}

impl Layout {
    fn compute(list: &InstList) -> Result<Self> {
        let len = list.len();
        let mut layout = Layout {
            offsets: Vec::new(),
            ext: Vec::new(),
            args: Vec::new(),
            sweeps: 0,
        };
        let grow = |_| Error::Allocation {
            what: "assembler layout",
        };
        layout.offsets.try_reserve(len + 1).map_err(grow)?;
        layout.ext.try_reserve(len).map_err(grow)?;
        layout.args.try_reserve(len).map_err(grow)?;

        for inst in &list.instructions {
            let arg = if inst.code.is_jump() {
                0
            } else {
                argument(inst, list.constants.len())?
            };
            layout.ext.push(val_size(arg as usize));
            layout.args.push(arg);
        }
        layout.offsets.resize(len + 1, 0);
        layout.place(list);

        layout.relax(list)?;
        Ok(layout)
    }

    /// Recomputes every offset from the current widths.
    fn place(&mut self, list: &InstList) {
        let mut offset = 0;
        for (i, inst) in list.instructions.iter().enumerate() {
            self.offsets[i] = offset;
            if inst.code != InstCode::NoOp {
                offset += usize::from(self.ext[i]) + 1;
            }
        }
        self.offsets[list.len()] = offset;
    }

    /// Widens jumps until every destination fits in its jump.
    ///
    /// Each sweep widens every jump that does not fit under the current
    /// offsets, then places the list again. Offsets only grow, so a jump
    /// is never made wider than its final destination needs.
    fn relax(&mut self, list: &InstList) -> Result<()> {
        loop {
            self.sweeps += 1;
            let mut widened = 0;
            for (i, inst) in list.instructions.iter().enumerate() {
                if !inst.code.is_jump() {
                    continue;
                }
                let needed = val_size(self.destination(inst)?);
                if needed > self.ext[i] {
                    self.ext[i] = needed;
                    widened += 1;
                }
            }

            if widened == 0 {
                return Ok(());
            }
            self.place(list);
            trace!(sweep = self.sweeps, widened, "widened jumps");
        }
    }

    fn destination(&self, inst: &Instruction) -> Result<usize> {
        let malformed = |message| Error::Malformed {
            span: inst.span,
            message,
        };
        match inst.operand {
            Operand::Jump(target) if target < 0 => Err(malformed("unresolved loop jump")),
            Operand::Jump(_) => inst
                .jump_target()
                .and_then(|target| self.offsets.get(target).copied())
                .ok_or_else(|| malformed("jump target out of range")),
            _ => Err(malformed("jump without a target")),
        }
    }

    fn total(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }
}

/// Returns the word argument of a non-jump instruction.
fn argument(inst: &Instruction, constants: usize) -> Result<u32> {
    let value = match inst.operand {
        Operand::None => 0,
        Operand::Int(value) => value,
        Operand::Const(index) => index as i64,
        Operand::Func(index) => (index + constants) as i64,
        Operand::Jump(_) => {
            return Err(Error::Malformed {
                span: inst.span,
                message: "jump operand on a non-jump instruction",
            });
        }
    };
    u32::try_from(value).map_err(|_| Error::Operand {
        span: inst.span,
        value,
    })
}

/// Assembles an instruction list and its nested functions.
///
/// # Errors
///
/// Fails on memory exhaustion, on operands that do not fit in 32 bits and
/// on jumps that were never resolved.
#[instrument(skip_all, fields(instructions = list.len()))]
pub fn assemble(list: &InstList) -> Result<Bytecode> {
    let layout = Layout::compute(list)?;
    let total = layout.total();

    let mut bytecode = Bytecode::new();
    let grow = |_| Error::Allocation { what: "bytecode" };
    bytecode.words.try_reserve(total).map_err(grow)?;
    bytecode.spans.try_reserve(total).map_err(grow)?;
    bytecode
        .constants
        .try_reserve(list.constants.len() + list.functions.len())
        .map_err(grow)?;

    for (i, inst) in list.instructions.iter().enumerate() {
        let Some(op) = OpCode::from_inst(inst.code) else {
            continue;
        };
        let arg = if op.is_jump() {
            let destination = layout.destination(inst)?;
            u32::try_from(destination).map_err(|_| Error::Operand {
                span: inst.span,
                value: destination as i64,
            })?
        } else {
            layout.args[i]
        };
        bytecode.push_op(op, arg, layout.ext[i], inst.span);
    }

    bytecode.constants.extend(list.constants.iter().cloned());
    for func in &list.functions {
        let body = assemble(&func.body)?;
        let function = Function::new(func.params.clone(), body);
        bytecode.constants.push(Value::Func(Arc::new(function)));
    }

    debug!(
        words = bytecode.len(),
        functions = list.functions.len(),
        "assembled instruction list"
    );
    Ok(bytecode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::instruction::FuncPrototype;

    fn list_of(instructions: &[(InstCode, Operand)]) -> InstList {
        let mut list = InstList::new();
        list.constants.push(Value::Null);
        for &(code, operand) in instructions {
            list.emit(Instruction::with_operand(code, operand, Span::default()))
                .unwrap();
        }
        list
    }

    fn decode_all(bytecode: &Bytecode) -> Vec<(OpCode, u32)> {
        let mut ops = Vec::new();
        let mut offset = 0;
        while let Some(decoded) = bytecode.decode_at(offset) {
            ops.push((decoded.op, decoded.arg));
            offset = decoded.next;
        }
        assert_eq!(offset, bytecode.len());
        ops
    }

    #[test]
    fn test_opcode_round_trip() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::from_u8(op as u8), Some(op));
        }
        assert_eq!(OpCode::from_u8(OpCode::ALL.len() as u8), None);
        assert_eq!(OpCode::from_inst(InstCode::NoOp), None);
        assert_eq!(OpCode::from_inst(InstCode::PushCatch), Some(OpCode::PushCatch));
    }

    #[test]
    fn test_val_size() {
        assert_eq!(val_size(0), 0);
        assert_eq!(val_size(0xff), 0);
        assert_eq!(val_size(0x100), 1);
        assert_eq!(val_size(0x1_0000), 2);
        assert_eq!(val_size(0x100_0000), 3);
    }

    #[test]
    fn test_simple_words() {
        let list = list_of(&[
            (InstCode::PushVal, Operand::Const(0)),
            (InstCode::NoOp, Operand::None),
            (InstCode::ReturnVal, Operand::None),
        ]);
        let bytecode = assemble(&list).unwrap();
        assert_eq!(
            bytecode.words,
            vec![pack(OpCode::PushVal, 0), pack(OpCode::ReturnVal, 0)]
        );
        assert_eq!(bytecode.spans.len(), 2);
        assert_eq!(bytecode.constants, vec![Value::Null]);
    }

    #[test]
    fn test_extended_argument() {
        let span = Span::new(crate::ast::Pos::new(0, 1), crate::ast::Pos::new(0, 4));
        let mut list = InstList::new();
        list.emit(Instruction::with_operand(
            InstCode::MakeArr,
            Operand::Int(0x0102_0304),
            span,
        ))
        .unwrap();
        let bytecode = assemble(&list).unwrap();
        assert_eq!(
            bytecode.words,
            vec![
                pack(OpCode::ExtendArg, 0x01),
                pack(OpCode::ExtendArg, 0x02),
                pack(OpCode::ExtendArg, 0x03),
                pack(OpCode::MakeArr, 0x04),
            ]
        );
        assert!(bytecode.spans.iter().all(|s| *s == span));
        assert_eq!(decode_all(&bytecode), vec![(OpCode::MakeArr, 0x0102_0304)]);
    }

    #[test]
    fn test_jump_offsets_skip_noops() {
        // 0 GET, 1 NO_OP, 2 JUMPIF_F 4, 3 NO_OP, 4 RET
        let list = list_of(&[
            (InstCode::GetVal, Operand::Const(0)),
            (InstCode::NoOp, Operand::None),
            (InstCode::JumpIfF, Operand::Jump(4)),
            (InstCode::NoOp, Operand::None),
            (InstCode::ReturnVal, Operand::None),
        ]);
        let bytecode = assemble(&list).unwrap();
        assert_eq!(
            decode_all(&bytecode),
            vec![
                (OpCode::GetVal, 0),
                (OpCode::JumpIfF, 2),
                (OpCode::ReturnVal, 0),
            ]
        );
    }

    #[test]
    fn test_jump_to_end_of_list() {
        let list = list_of(&[
            (InstCode::GetVal, Operand::Const(0)),
            (InstCode::JumpIfT, Operand::Jump(3)),
            (InstCode::PopVal, Operand::None),
        ]);
        let bytecode = assemble(&list).unwrap();
        assert_eq!(decode_all(&bytecode)[1], (OpCode::JumpIfT, 3));
        assert_eq!(bytecode.len(), 3);
    }

    #[test]
    fn test_far_jump_is_widened() {
        let mut instructions = vec![(InstCode::Jump, Operand::Jump(257))];
        instructions.extend([(InstCode::PopVal, Operand::None); 256]);
        instructions.push((InstCode::ReturnVal, Operand::None));
        let bytecode = assemble(&list_of(&instructions)).unwrap();

        assert_eq!(bytecode.len(), 259);
        assert_eq!(bytecode.words[0], pack(OpCode::ExtendArg, 1));
        assert_eq!(bytecode.words[1], pack(OpCode::Jump, 2));
        assert_eq!(bytecode.words[258], pack(OpCode::ReturnVal, 0));
    }

    #[test]
    fn test_widening_cascades() {
        // Widening the first jump pushes the target of the second past 255
        let mut instructions = vec![
            (InstCode::Jump, Operand::Jump(256)),
            (InstCode::Jump, Operand::Jump(255)),
        ];
        instructions.extend([(InstCode::PopVal, Operand::None); 253]);
        instructions.push((InstCode::ReturnVal, Operand::None));
        instructions.push((InstCode::ReturnVal, Operand::None));
        let bytecode = assemble(&list_of(&instructions)).unwrap();

        let ops = decode_all(&bytecode);
        assert_eq!(ops[0], (OpCode::Jump, 258));
        assert_eq!(ops[1], (OpCode::Jump, 257));
        assert_eq!(bytecode.len(), 259);
        assert_eq!(bytecode.words[257], pack(OpCode::ReturnVal, 0));
        assert_eq!(bytecode.words[258], pack(OpCode::ReturnVal, 0));
    }

    #[test]
    fn test_many_far_jumps_widen_together() {
        let mut instructions = vec![(InstCode::Jump, Operand::Jump(340)); 40];
        instructions.extend([(InstCode::PopVal, Operand::None); 300]);
        instructions.push((InstCode::ReturnVal, Operand::None));
        let list = list_of(&instructions);

        let layout = Layout::compute(&list).unwrap();
        assert_eq!(layout.sweeps, 2);
        assert!(layout.ext[..40].iter().all(|&ext| ext == 1));
        assert_eq!(layout.total(), 381);

        let ops = decode_all(&assemble(&list).unwrap());
        assert!(ops[..40].iter().all(|&op| op == (OpCode::Jump, 380)));
        assert_eq!(ops[340], (OpCode::ReturnVal, 0));
    }

    #[test]
    fn test_nested_function_is_appended() {
        let mut list = list_of(&[
            (InstCode::MakeFunc, Operand::Func(0)),
            (InstCode::ReturnVal, Operand::None),
        ]);
        let body = list_of(&[
            (InstCode::PushVal, Operand::Const(0)),
            (InstCode::ReturnVal, Operand::None),
        ]);
        list.add_function(FuncPrototype {
            params: vec![Arc::from("a")],
            body,
        })
        .unwrap();

        let bytecode = assemble(&list).unwrap();
        assert_eq!(decode_all(&bytecode)[0], (OpCode::MakeFunc, 1));
        let Value::Func(func) = &bytecode.constants[1] else {
            panic!("expected a function constant");
        };
        assert_eq!(func.arity(), 1);
        assert_eq!(func.body.len(), 2);
    }

    #[test]
    fn test_rejects_bad_operands() {
        let list = list_of(&[(InstCode::Jump, Operand::Jump(-2))]);
        assert!(matches!(assemble(&list), Err(Error::Malformed { .. })));

        let list = list_of(&[(InstCode::Jump, Operand::Jump(9))]);
        assert!(matches!(assemble(&list), Err(Error::Malformed { .. })));

        let list = list_of(&[(InstCode::MakeArr, Operand::Int(-1))]);
        assert!(matches!(
            assemble(&list),
            Err(Error::Operand { value: -1, .. })
        ));
    }
}
