//! Human-readable listing of assembled bytecode.
//!
//! Every word is printed on its own line with its offset, mnemonic and
//! argument byte. When extension words precede an operation, the full
//! argument is printed as well. Operator and constant arguments are
//! annotated with what they refer to. The constant pool follows the code,
//! with functions listed recursively.

use std::fmt;

use super::{Bytecode, OpCode, unpack};
use crate::ast::Operator;
use crate::runtime::value::Value;

const INDENT: &str = "  ";

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_listing(f, self, 0)
    }
}

fn write_listing(f: &mut fmt::Formatter<'_>, code: &Bytecode, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    let mut extended: u32 = 0;

    for (offset, &word) in code.words.iter().enumerate() {
        let (byte, arg) = unpack(word);
        let Some(op) = OpCode::from_u8(byte) else {
            writeln!(f, "{pad}{offset:>5} | ??? {byte:#04x} {arg}")?;
            extended = 0;
            continue;
        };
        write!(f, "{pad}{offset:>5} | {:<8} {arg:>3}", op.mnemonic())?;

        if op == OpCode::ExtendArg {
            extended = (extended << 8) | u32::from(arg);
            writeln!(f)?;
            continue;
        }

        let full = (extended << 8) | u32::from(arg);
        extended = 0;
        if full != u32::from(arg) {
            write!(f, " (extended: {full})")?;
        }
        annotate(f, code, op, full)?;
        writeln!(f)?;
    }

    if code.constants.is_empty() {
        return Ok(());
    }
    writeln!(f, "{pad}Objects:")?;
    for (index, value) in code.constants.iter().enumerate() {
        match value {
            Value::Func(func) => {
                writeln!(
                    f,
                    "{pad}{index:>5} | <Func {} args> ({})",
                    func.arity(),
                    func.params.join(", ")
                )?;
                write_listing(f, &func.body, depth + 1)?;
            }
            other => writeln!(f, "{pad}{index:>5} | ({}) {}", other.type_of(), other.repr())?,
        }
    }
    Ok(())
}

fn annotate(f: &mut fmt::Formatter<'_>, code: &Bytecode, op: OpCode, arg: u32) -> fmt::Result {
    match op {
        OpCode::StackOp | OpCode::LocalOp => match Operator::from_code(i64::from(arg)) {
            Some(operator) => write!(f, " [{}]", operator.symbol()),
            None => write!(f, " [?]"),
        },
        OpCode::PushVal | OpCode::GetVal | OpCode::SetVal | OpCode::SetValLoc => {
            match code.constants.get(arg as usize) {
                Some(value) => write!(f, " [({}) {}]", value.type_of(), value.repr()),
                None => write!(f, " [?]"),
            }
        }
        _ => Ok(()),
    }
}
