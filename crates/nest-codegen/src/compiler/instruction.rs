//! Intermediate instruction definitions.

use std::fmt;
use std::sync::Arc;

use crate::ast::Span;
use crate::runtime::value::Value;
use crate::{Result, try_push};

/// An instruction list produced by the compiler.
///
/// Jump operands are indices into `instructions`, not word offsets; the
/// assembler resolves them once instruction sizes are known.
#[derive(Debug, Clone, Default)]
pub struct InstList {
    /// The instructions
    pub instructions: Vec<Instruction>,
    /// The constant pool
    pub constants: Vec<Value>,
    /// Nested functions, addressed by `MakeFunc`
    pub functions: Vec<FuncPrototype>,
}

impl InstList {
    /// Creates a new empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if there are no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Adds an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> Result<usize> {
        let index = self.instructions.len();
        try_push(&mut self.instructions, instruction, "instruction list")?;
        Ok(index)
    }

    /// Adds a constant and returns its index.
    pub fn add_constant(&mut self, value: Value) -> Result<usize> {
        let index = self.constants.len();
        try_push(&mut self.constants, value, "constant pool")?;
        Ok(index)
    }

    /// Returns the index of an equal constant, adding it if needed.
    pub fn add_constant_dedup(&mut self, value: Value) -> Result<usize> {
        match self.constants.iter().position(|c| *c == value) {
            Some(index) => Ok(index),
            None => self.add_constant(value),
        }
    }

    /// Adds a nested function and returns its index.
    pub fn add_function(&mut self, function: FuncPrototype) -> Result<usize> {
        let index = self.functions.len();
        try_push(&mut self.functions, function, "function list")?;
        Ok(index)
    }

    /// Returns the constant an instruction refers to, if any.
    pub fn constant_of(&self, instruction: &Instruction) -> Option<&Value> {
        match instruction.operand {
            Operand::Const(index) => self.constants.get(index),
            _ => None,
        }
    }

    /// Returns true if `instruction` refers to the string constant `name`.
    pub fn refers_to(&self, instruction: &Instruction, name: &str) -> bool {
        self.constant_of(instruction)
            .is_some_and(|value| value.is_str(name))
    }
}

impl fmt::Display for InstList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, inst) in self.instructions.iter().enumerate() {
            write!(f, "{i:>4} {:<12}", inst.code.name())?;
            match inst.operand {
                Operand::None => {}
                Operand::Int(value) | Operand::Jump(value) => write!(f, " {value}")?,
                Operand::Const(index) => match self.constants.get(index) {
                    Some(value) => write!(f, " {index} ({})", value.repr())?,
                    None => write!(f, " {index} (?)")?,
                },
                Operand::Func(index) => write!(f, " <func {index}>")?,
            }
            writeln!(f)?;
        }
        for (i, func) in self.functions.iter().enumerate() {
            writeln!(f, "\n<func {i}> ({} args)", func.params.len())?;
            write!(f, "{}", func.body)?;
        }
        Ok(())
    }
}

/// A nested function waiting to be assembled.
#[derive(Debug, Clone)]
pub struct FuncPrototype {
    /// Parameter names
    pub params: Vec<Arc<str>>,
    /// The compiled body
    pub body: InstList,
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation
    pub code: InstCode,
    /// Optional operand
    pub operand: Operand,
    /// The source span the instruction comes from
    pub span: Span,
}

impl Instruction {
    /// Creates a new instruction with no operand.
    pub fn simple(code: InstCode, span: Span) -> Self {
        Self {
            code,
            operand: Operand::None,
            span,
        }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(code: InstCode, operand: Operand, span: Span) -> Self {
        Self {
            code,
            operand,
            span,
        }
    }

    /// Returns the target of a jump instruction.
    pub fn jump_target(&self) -> Option<usize> {
        match (self.code.is_jump(), self.operand) {
            (true, Operand::Jump(target)) => usize::try_from(target).ok(),
            _ => None,
        }
    }

    /// Turns the instruction into a `NoOp`.
    pub fn clear(&mut self) {
        self.code = InstCode::NoOp;
        self.operand = Operand::None;
    }
}

/// Instruction operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operand {
    /// No operand
    #[default]
    None,
    /// Count or operator code
    Int(i64),
    /// Constant pool index
    Const(usize),
    /// Index into the list's functions
    Func(usize),
    /// Instruction index; negative while a loop placeholder
    Jump(i64),
}

/// IR operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstCode {
    /// Does nothing; removed by the optimizer and the assembler
    NoOp,

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
    /// Replace the top integer with a fresh copy used as loop counter
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
    /// Push a nested function
    MakeFunc,
    /// Push the error being handled
    SaveError,
    /// Replace a sequence with its items, first item on top
    UnpackSeq,
    /// Check that the top value has a type
    TypeCheck,
    /// Check that the top value is hashable
    HashCheck,

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

impl InstCode {
    /// Returns true if the operand is an instruction index.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            InstCode::Jump
                | InstCode::JumpIfT
                | InstCode::JumpIfF
                | InstCode::JumpIfZero
                | InstCode::PushCatch
        )
    }

    /// Returns true if control never reaches the next instruction.
    pub fn ends_flow(self) -> bool {
        matches!(
            self,
            InstCode::Jump | InstCode::ReturnVal | InstCode::ReturnVars | InstCode::ThrowErr
        )
    }

    /// Returns the name used in listings.
    pub fn name(self) -> &'static str {
        match self {
            InstCode::NoOp => "NO_OP",
            InstCode::PopVal => "POP_VAL",
            InstCode::ForStart => "FOR_START",
            InstCode::ForIsDone => "FOR_IS_DONE",
            InstCode::ForGetVal => "FOR_GET_VAL",
            InstCode::ForAdvance => "FOR_ADVANCE",
            InstCode::ReturnVal => "RETURN_VAL",
            InstCode::ReturnVars => "RETURN_VARS",
            InstCode::SetValLoc => "SET_VAL_LOC",
            InstCode::SetContLoc => "SET_CONT_LOC",
            InstCode::ThrowErr => "THROW_ERR",
            InstCode::PopCatch => "POP_CATCH",
            InstCode::SetVal => "SET_VAL",
            InstCode::GetVal => "GET_VAL",
            InstCode::PushVal => "PUSH_VAL",
            InstCode::SetContVal => "SET_CONT_VAL",
            InstCode::Call => "CALL",
            InstCode::SeqCall => "SEQ_CALL",
            InstCode::Cast => "CAST",
            InstCode::Range => "RANGE",
            InstCode::StackOp => "STACK_OP",
            InstCode::LocalOp => "LOCAL_OP",
            InstCode::Import => "IMPORT",
            InstCode::Extract => "EXTRACT",
            InstCode::DecInt => "DEC_INT",
            InstCode::NewInt => "NEW_INT",
            InstCode::Dup => "DUP",
            InstCode::Rot2 => "ROT_2",
            InstCode::Rot3 => "ROT_3",
            InstCode::MakeArr => "MAKE_ARR",
            InstCode::MakeArrRep => "MAKE_ARR_REP",
            InstCode::MakeVec => "MAKE_VEC",
            InstCode::MakeVecRep => "MAKE_VEC_REP",
            InstCode::MakeMap => "MAKE_MAP",
            InstCode::MakeFunc => "MAKE_FUNC",
            InstCode::SaveError => "SAVE_ERROR",
            InstCode::UnpackSeq => "UNPACK_SEQ",
            InstCode::TypeCheck => "TYPE_CHECK",
            InstCode::HashCheck => "HASH_CHECK",
            InstCode::Jump => "JUMP",
            InstCode::JumpIfT => "JUMPIF_T",
            InstCode::JumpIfF => "JUMPIF_F",
            InstCode::JumpIfZero => "JUMPIF_ZERO",
            InstCode::PushCatch => "PUSH_CATCH",
        }
    }
}

impl fmt::Display for InstCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
