//! The debug-build verifier (spec.md §7 "Verification mode", §8 invariants
//! 1–3). Run after every pass; fails fast on the first violation rather
//! than attempting to collect or recover from more than one, matching
//! spec.md §7's "passes do not attempt recovery" policy.

use crate::error::{CoreError, CoreResult};
use crate::function::Function;

/// Checks invariants 1–3 from spec.md §8:
/// 1. every value's `uses` counter matches actual occurrences,
/// 2. block edges are symmetric (`succs[i] = (s,j) => s.preds[j] = (b,i)`),
/// 3. every phi's arg count matches its block's predecessor count.
pub fn verify_function(func: &Function, pass_name: &'static str) -> CoreResult<()> {
    verify_use_counts(func, pass_name)?;
    verify_edges(func, pass_name)?;
    verify_phis(func, pass_name)?;
    Ok(())
}

fn verify_use_counts(func: &Function, pass_name: &'static str) -> CoreResult<()> {
    use std::collections::HashMap;
    let mut counted: HashMap<_, u32> = HashMap::new();
    for b in func.blocks() {
        for &v in func.block_values(b) {
            func.value_op(v).for_each_value(|arg| {
                *counted.entry(arg).or_insert(0) += 1;
            });
        }
    }
    for b in func.blocks() {
        for &v in func.block_values(b) {
            let expected = counted.get(&v).copied().unwrap_or(0);
            if func.value_uses(v) != expected {
                return Err(CoreError::structural(
                    pass_name,
                    format!(
                        "use-count mismatch: {} reports {} uses, actual {}",
                        v,
                        func.value_uses(v),
                        expected
                    ),
                )
                .with_value(v)
                .with_block(b));
            }
        }
    }
    Ok(())
}

fn verify_edges(func: &Function, pass_name: &'static str) -> CoreResult<()> {
    for b in func.blocks() {
        for (i, &(s, j)) in func.succs(b).iter().enumerate() {
            let preds = func.preds(s);
            if preds.get(j) != Some(&(b, i)) {
                return Err(CoreError::structural(
                    pass_name,
                    format!("edge invariant violated: {b}.succs[{i}] = ({s},{j}) but {s}.preds[{j}] != ({b},{i})"),
                )
                .with_block(b));
            }
        }
    }
    Ok(())
}

fn verify_phis(func: &Function, pass_name: &'static str) -> CoreResult<()> {
    for b in func.blocks() {
        let npreds = func.preds(b).len();
        for &v in func.block_values(b) {
            if let crate::op::Op::Phi(args) = func.value_op(v) {
                if args.len() != npreds {
                    return Err(CoreError::structural(
                        pass_name,
                        format!(
                            "phi {v} has {} args but block {b} has {npreds} predecessors",
                            args.len()
                        ),
                    )
                    .with_value(v)
                    .with_block(b));
                }
            }
        }
    }
    Ok(())
}

/// Spec.md §8 invariant 4: after `decompose`, no phi has a compound
/// (slice/string) type.
pub fn verify_no_compound_phis(func: &Function, pass_name: &'static str) -> CoreResult<()> {
    for b in func.blocks() {
        for &v in func.block_values(b) {
            if func.value_op(v).is_phi() {
                let ty = func.value_type(v);
                if func.types.is_string(ty) {
                    return Err(CoreError::structural(
                        pass_name,
                        format!("phi {v} still has compound (string) type after decompose"),
                    )
                    .with_value(v)
                    .with_block(b));
                }
            }
        }
    }
    Ok(())
}
