//! Peephole rewrites on instruction lists.
//!
//! Every pass scans the list once and reports whether it changed anything.
//! Removed instructions are first turned into `NoOp`s so that jump indices
//! stay valid while the passes run; compaction at the end of each round
//! drops them and renumbers the jumps. Rounds repeat until none of the
//! passes changes anything.
//!
//! A rewrite that merges two instructions is only valid when no jump lands
//! on the second one, since a path arriving there would skip the first.

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::compiler::instruction::{InstCode, InstList, Instruction, Operand};
use crate::runtime::value::Value;
use crate::{Error, Result};

/// Runs every pass on `list` and its nested functions until nothing
/// changes.
///
/// Returns true if the list or any nested function changed.
pub fn optimize(list: &mut InstList) -> Result<bool> {
    let max_rounds = list.len() + 1;
    let mut changed_any = false;

    for round in 0..max_rounds {
        let before = list.len();
        let changed = run_round(list)?;
        trace!(round, before, after = list.len(), changed, "peephole round");
        if !changed {
            break;
        }
        changed_any = true;
    }
    Ok(changed_any)
}

fn run_round(list: &mut InstList) -> Result<bool> {
    let mut changed = false;
    changed |= remove_push_check(list);
    changed |= remove_push_pop(list);
    changed |= fuse_store_pop(list);
    changed |= fuse_store_load(list);
    changed |= fold_constant_jumps(list);
    changed |= collapse_jump_chains(list);
    changed |= remove_dead_code(list);
    for func in &mut list.functions {
        changed |= optimize(&mut func.body)?;
    }
    changed |= compact(list)?;
    Ok(changed)
}

/// Collects the index of every instruction some jump lands on.
fn jump_targets(instructions: &[Instruction]) -> FxHashSet<usize> {
    instructions
        .iter()
        .filter_map(Instruction::jump_target)
        .collect()
}

/// Applies `rewrite` to every adjacent pair whose second instruction is
/// not a jump target.
fn rewrite_pairs<F>(list: &mut InstList, mut rewrite: F) -> bool
where
    F: FnMut(&[Value], &mut Instruction, &mut Instruction) -> bool,
{
    let targets = jump_targets(&list.instructions);
    let mut changed = false;

    for i in 1..list.instructions.len() {
        if targets.contains(&i) {
            continue;
        }
        let (head, tail) = list.instructions.split_at_mut(i);
        let (Some(first), Some(second)) = (head.last_mut(), tail.first_mut()) else {
            continue;
        };
        changed |= rewrite(&list.constants, first, second);
    }
    changed
}

fn constant<'a>(constants: &'a [Value], inst: &Instruction) -> Option<&'a Value> {
    match inst.operand {
        Operand::Const(index) => constants.get(index),
        _ => None,
    }
}

/// `PUSH_VAL c; TYPE_CHECK t` and `PUSH_VAL c; HASH_CHECK` when the check
/// is known to pass.
fn remove_push_check(list: &mut InstList) -> bool {
    rewrite_pairs(list, |constants, push, check| {
        if push.code != InstCode::PushVal {
            return false;
        }
        let Some(value) = constant(constants, push) else {
            return false;
        };
        let passes = match check.code {
            InstCode::TypeCheck => {
                constant(constants, check) == Some(&Value::Type(value.type_of()))
            }
            InstCode::HashCheck => value.is_hashable(),
            _ => false,
        };
        if passes {
            check.clear();
        }
        passes
    })
}

/// `PUSH_VAL c; POP_VAL`
fn remove_push_pop(list: &mut InstList) -> bool {
    rewrite_pairs(list, |_, push, pop| {
        if push.code != InstCode::PushVal || pop.code != InstCode::PopVal {
            return false;
        }
        push.clear();
        pop.clear();
        true
    })
}

/// `SET_VAL x; POP_VAL` becomes `SET_VAL_LOC x`, and the same for
/// container stores.
fn fuse_store_pop(list: &mut InstList) -> bool {
    rewrite_pairs(list, |_, store, pop| {
        if pop.code != InstCode::PopVal {
            return false;
        }
        store.code = match store.code {
            InstCode::SetVal => InstCode::SetValLoc,
            InstCode::SetContVal => InstCode::SetContLoc,
            _ => return false,
        };
        pop.clear();
        true
    })
}

/// `SET_VAL_LOC x; GET_VAL x` becomes `SET_VAL x`.
fn fuse_store_load(list: &mut InstList) -> bool {
    rewrite_pairs(list, |constants, store, load| {
        if store.code != InstCode::SetValLoc || load.code != InstCode::GetVal {
            return false;
        }
        let same_name = match (constant(constants, store), constant(constants, load)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if !same_name {
            return false;
        }
        store.code = InstCode::SetVal;
        load.clear();
        true
    })
}

/// `PUSH_VAL c; JUMPIF_T/JUMPIF_F` becomes a `JUMP` or nothing.
fn fold_constant_jumps(list: &mut InstList) -> bool {
    rewrite_pairs(list, |constants, push, jump| {
        if push.code != InstCode::PushVal {
            return false;
        }
        let jumps_on = match jump.code {
            InstCode::JumpIfT => true,
            InstCode::JumpIfF => false,
            _ => return false,
        };
        let Some(value) = constant(constants, push) else {
            return false;
        };

        if value.is_truthy() == jumps_on {
            jump.code = InstCode::Jump;
        } else {
            jump.clear();
        }
        push.clear();
        true
    })
}

/// Points jumps that land on a `JUMP` at its final destination.
fn collapse_jump_chains(list: &mut InstList) -> bool {
    let instructions = &mut list.instructions;
    let mut changed = false;
    let mut visited = FxHashSet::default();

    for i in 0..instructions.len() {
        let Some(start) = instructions[i].jump_target() else {
            continue;
        };

        visited.clear();
        visited.insert(i);
        let mut target = start;
        while let Some(next) = instructions
            .get(target)
            .filter(|inst| inst.code == InstCode::Jump)
            .and_then(Instruction::jump_target)
        {
            // A cycle never reaches a real destination
            if !visited.insert(target) {
                target = start;
                break;
            }
            target = next;
        }

        if target != start {
            instructions[i].operand = Operand::Jump(target as i64);
            changed = true;
        }
    }
    changed
}

/// Clears every instruction that cannot be reached from the entry, then
/// every forward `JUMP` that only skips cleared instructions.
fn remove_dead_code(list: &mut InstList) -> bool {
    let instructions = &mut list.instructions;
    let len = instructions.len();
    if len == 0 {
        return false;
    }

    let mut reachable = vec![false; len];
    let mut pending = vec![0];
    while let Some(i) = pending.pop() {
        let Some(seen) = reachable.get_mut(i) else {
            continue;
        };
        if *seen {
            continue;
        }
        *seen = true;

        let inst = &instructions[i];
        if let Some(target) = inst.jump_target() {
            pending.push(target);
        }
        if !inst.code.ends_flow() {
            pending.push(i + 1);
        }
    }

    let mut changed = false;
    for (inst, _) in instructions
        .iter_mut()
        .zip(&reachable)
        .filter(|(inst, live)| !**live && inst.code != InstCode::NoOp)
    {
        inst.clear();
        changed = true;
    }

    for i in 0..len {
        if instructions[i].code != InstCode::Jump {
            continue;
        }
        let Some(target) = instructions[i].jump_target() else {
            continue;
        };
        if target <= i {
            continue;
        }
        let skipped = instructions.get(i + 1..target).unwrap_or(&[]);
        if skipped.iter().all(|inst| inst.code == InstCode::NoOp) {
            instructions[i].clear();
            changed = true;
        }
    }

    if changed {
        trace!(instructions = len, "removed dead code");
    }
    changed
}

/// Drops `NoOp`s and renumbers the jumps.
///
/// A jump to a dropped instruction lands on the next one that is kept.
fn compact(list: &mut InstList) -> Result<bool> {
    let len = list.instructions.len();

    // new_index[i] is the number of kept instructions before i
    let mut new_index = Vec::new();
    new_index
        .try_reserve(len + 1)
        .map_err(|_| Error::Allocation { what: "jump remap table" })?;
    let mut kept = 0;
    for inst in &list.instructions {
        new_index.push(kept);
        if inst.code != InstCode::NoOp {
            kept += 1;
        }
    }
    new_index.push(kept);

    if kept == len {
        return Ok(false);
    }

    for inst in &mut list.instructions {
        if let Some(target) = inst.jump_target() {
            let target = new_index.get(target).copied().unwrap_or(kept);
            inst.operand = Operand::Jump(target as i64);
        }
    }
    list.instructions.retain(|inst| inst.code != InstCode::NoOp);
    Ok(true)
}
