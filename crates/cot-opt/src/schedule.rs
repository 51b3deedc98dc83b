//! `schedule`: assign a total order to values within each block consistent
//! with data-flow dependencies and side-effect ordering (spec.md §4.2 step
//! 5). The builder already emits operands before their uses, so the only
//! remaining job is keeping side-effecting ops in their original relative
//! order while letting rematerializable ops (constants, address
//! computations) float — `cot-wasm::gen` re-emits those at each use site
//! anyway, so their position in the schedule only matters for readability
//! of dumps, not correctness.

use cot_ssa::{Function, Op};

pub fn run(func: &mut Function) {
    for b in func.blocks().collect::<Vec<_>>() {
        schedule_block(func, b);
    }
}

fn schedule_block(func: &mut Function, b: cot_ssa::Block) {
    let values = func.block_values(b).to_vec();
    if values.is_empty() {
        return;
    }
    let (terminator, rest) = values.split_last().expect("non-empty block");
    debug_assert!(func.value_op(*terminator).is_terminator());

    let mut ordered = Vec::with_capacity(rest.len());
    let mut floaters = Vec::new();
    for &v in rest {
        if is_side_effecting(func.value_op(v)) || func.value_op(v).is_phi() {
            ordered.push(v);
        } else {
            floaters.push(v);
        }
    }
    // Rematerializable/pure values are scheduled directly before their
    // first use among the side-effecting spine, preserving a valid
    // topological order (every pure value already appears after its own
    // operands thanks to builder insertion order).
    let mut result = Vec::with_capacity(rest.len());
    let mut floaters_by_first_use: Vec<_> = floaters
        .iter()
        .map(|&v| (first_use_index(func, &ordered, v), v))
        .collect();
    floaters_by_first_use.sort_by_key(|(idx, _)| *idx);

    let mut fi = 0;
    for (i, &v) in ordered.iter().enumerate() {
        while fi < floaters_by_first_use.len() && floaters_by_first_use[fi].0 <= i {
            result.push(floaters_by_first_use[fi].1);
            fi += 1;
        }
        result.push(v);
    }
    while fi < floaters_by_first_use.len() {
        result.push(floaters_by_first_use[fi].1);
        fi += 1;
    }
    result.push(*terminator);

    func.set_block_values(b, result);
}

fn is_side_effecting(op: &Op) -> bool {
    matches!(
        op,
        Op::Call { .. }
            | Op::StaticCall { .. }
            | Op::CallIndirect { .. }
            | Op::Store { .. }
            | Op::Load { .. }
            | Op::Alloc { .. }
            | Op::Retain(_)
            | Op::Release(_)
            | Op::DeinitCall { .. }
    ) || op.is_terminator()
}

fn first_use_index(func: &Function, ordered: &[cot_ssa::Value], needle: cot_ssa::Value) -> usize {
    for (i, &v) in ordered.iter().enumerate() {
        let mut found = false;
        func.value_op(v).for_each_value(|arg| found |= arg == needle);
        if found {
            return i;
        }
    }
    ordered.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ssa::{BlockKind, SourcePos, TypeIndex};

    #[test]
    fn schedule_preserves_terminator_last() {
        let mut f = Function::new("f");
        let b = f.create_block(BlockKind::Ret);
        let pos = SourcePos::default();
        let a = f.append(b, Op::IConst(1), TypeIndex::I64, pos);
        f.append(b, Op::Return(vec![a]), TypeIndex::VOID, pos);
        run(&mut f);
        let vs = f.block_values(b);
        assert!(f.value_op(*vs.last().unwrap()).is_terminator());
    }
}
