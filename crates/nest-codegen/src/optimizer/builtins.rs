//! Substitution of built-in names with their values.
//!
//! Reads of names like `Int` or `true` normally go through the variable
//! table. When a unit provably never rebinds such a name, the read is
//! replaced with a push of the value itself.
//!
//! A name can be rebound directly (`Int = 3`, a parameter called `Int`,
//! `_vars_.Int = 3`) or through a scope alias stored somewhere else
//! (`v = _vars_`). The first kind is checked per name. The second kind
//! disables every substitution in the unit: the aliases may only appear in
//! a few shapes that cannot leak the scope.

use tracing::trace;

use crate::Result;
use crate::compiler::instruction::{InstCode, InstList, Instruction, Operand};
use crate::runtime::value::{Type, Value};

/// Names that expose a variable scope as a map.
pub const SCOPE_ALIASES: [&str; 2] = ["_vars_", "_globals_"];

/// The substitutable names and their values.
pub fn builtins() -> impl Iterator<Item = (&'static str, Value)> {
    Type::ALL
        .into_iter()
        .map(|ty| (ty.name(), Value::Type(ty)))
        .chain([
            ("true", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("null", Value::Null),
        ])
}

/// Replaces reads of built-in names in `list` and its nested functions.
///
/// Returns the number of instructions rewritten.
pub fn substitute(list: &mut InstList) -> Result<usize> {
    if !can_substitute(list) {
        trace!("scope alias escapes, builtins left alone");
        return Ok(0);
    }

    let mut replaced = 0;
    for (name, value) in builtins() {
        if has_assignments(list, name) {
            trace!(name, "builtin is reassigned");
            continue;
        }
        replaced += replace_access(list, name, &value)?;
    }
    Ok(replaced)
}

/// Returns true if no scope alias is rebound or leaks.
pub fn can_substitute(list: &InstList) -> bool {
    SCOPE_ALIASES
        .iter()
        .all(|alias| !has_assignments(list, alias) && !is_accessed(list, alias))
}

fn is_check(code: InstCode) -> bool {
    matches!(
        code,
        InstCode::LocalOp | InstCode::HashCheck | InstCode::TypeCheck
    )
}

/// Returns true if the scope alias `name` is used in a way that could
/// reach a variable indirectly.
///
/// Allowed uses of `GET_VAL name` are:
/// - any number of `LOCAL_OP`, `HASH_CHECK` and `TYPE_CHECK` followed by
///   `POP_VAL`, `JUMPIF_T` or `JUMPIF_F`
/// - `PUSH_VAL key` followed by `EXTRACT` or `SET_CONT_VAL`
///
/// Extracting the alias from a module (`PUSH_VAL name; EXTRACT`) always
/// counts as an access.
pub fn is_accessed(list: &InstList, name: &str) -> bool {
    let insts = &list.instructions;
    let code_at = |i: usize| insts.get(i).map(|inst| inst.code);

    let mut i = 0;
    while i < insts.len() {
        let inst = &insts[i];
        if !list.refers_to(inst, name) {
            i += 1;
            continue;
        }

        match inst.code {
            InstCode::PushVal => {
                if code_at(i + 1) == Some(InstCode::Extract) {
                    return true;
                }
            }
            InstCode::GetVal => match code_at(i + 1) {
                Some(code) if is_check(code) => {
                    let mut j = i + 2;
                    while code_at(j).is_some_and(is_check) {
                        j += 1;
                    }
                    if !matches!(
                        code_at(j),
                        Some(InstCode::PopVal | InstCode::JumpIfT | InstCode::JumpIfF)
                    ) {
                        return true;
                    }
                    i = j;
                }
                Some(InstCode::PushVal) => {
                    if !matches!(
                        code_at(i + 2),
                        Some(InstCode::Extract | InstCode::SetContVal)
                    ) {
                        return true;
                    }
                }
                _ => return true,
            },
            _ => {}
        }
        i += 1;
    }

    list.functions
        .iter()
        .any(|func| is_accessed(&func.body, name))
}

/// Returns true if `name` is stored to, declared as a parameter, or set
/// through a container in `list` or its nested functions.
pub fn has_assignments(list: &InstList, name: &str) -> bool {
    let mut prev: Option<&Instruction> = None;
    for inst in &list.instructions {
        let assigned = match inst.code {
            InstCode::SetVal | InstCode::SetValLoc => list.refers_to(inst, name),
            InstCode::SetContVal | InstCode::SetContLoc => prev.is_some_and(|prev| {
                prev.code == InstCode::PushVal && list.refers_to(prev, name)
            }),
            _ => false,
        };
        if assigned {
            return true;
        }
        prev = Some(inst);
    }

    list.functions.iter().any(|func| {
        func.params.iter().any(|param| &**param == name) || has_assignments(&func.body, name)
    })
}

/// Turns every `GET_VAL name` into a push of `value`.
fn replace_access(list: &mut InstList, name: &str, value: &Value) -> Result<usize> {
    let reads: Vec<usize> = list
        .instructions
        .iter()
        .enumerate()
        .filter(|(_, inst)| inst.code == InstCode::GetVal && list.refers_to(inst, name))
        .map(|(i, _)| i)
        .collect();

    let mut replaced = reads.len();
    if !reads.is_empty() {
        let index = list.add_constant_dedup(value.clone())?;
        for i in reads {
            let inst = &mut list.instructions[i];
            inst.code = InstCode::PushVal;
            inst.operand = Operand::Const(index);
        }
    }

    for func in &mut list.functions {
        replaced += replace_access(&mut func.body, name, value)?;
    }
    Ok(replaced)
}
