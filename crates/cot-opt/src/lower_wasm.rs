//! `lower_wasm`: rewrite generic ops into Wasm-specific ops (spec.md §4.2
//! step 3). Only meaningful on the Wasm path — the native path skips this
//! pass entirely and goes through `cot-wasm2clif` instead.
//!
//! Comparisons become `i32` on Wasm (there is no native `i1`); `cond_select`
//! becomes `wasm_select` with Wasm's `select` operand order
//! (`[then, else, cond]`, already matched by `Op::CondSelect`/`WasmSelect`).

use cot_ssa::{Function, Op, TypeIndex};

pub fn run(func: &mut Function) {
    let targets: Vec<_> = func.blocks().flat_map(|b| func.block_values(b).to_vec()).collect();
    for v in targets {
        let ty = func.value_type(v);
        let is_64 = ty == TypeIndex::I64 || ty == TypeIndex::U64;
        let new_op = match func.value_op(v).clone() {
            Op::IAdd(a, b) if is_64 => Some(Op::WasmI64Add(a, b)),
            Op::IAdd(a, b) => Some(Op::WasmI32Add(a, b)),
            Op::ICmp(cc, a, b) => Some(Op::ICmp(cc, a, b)), // comparisons retype below
            Op::CondSelect { then, else_, cond } => Some(Op::WasmSelect { then, else_, cond }),
            Op::IConst(k) if is_64 => Some(Op::WasmIConst64(k)),
            Op::IConst(k) => Some(Op::WasmIConst32(k as i32)),
            _ => None,
        };
        if let Some(new_op) = new_op {
            if !func.value_op(v).is_terminator() {
                func.set_op(v, new_op);
            }
        }
        if matches!(func.value_op(v), Op::ICmp(..) | Op::FCmp(..)) {
            // Comparisons become i32 on Wasm regardless of operand width.
            func.retype(v, TypeIndex::I32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ssa::{BlockKind, SourcePos};

    #[test]
    fn i64_add_becomes_wasm_i64_add() {
        let mut f = Function::new("f");
        let b = f.create_block(BlockKind::First);
        let pos = SourcePos::default();
        let x = f.append(b, Op::IConst(1), TypeIndex::I64, pos);
        let y = f.append(b, Op::IConst(2), TypeIndex::I64, pos);
        let sum = f.append(b, Op::IAdd(x, y), TypeIndex::I64, pos);
        run(&mut f);
        assert!(matches!(f.value_op(sum), Op::WasmI64Add(..)));
    }

    #[test]
    fn comparisons_are_retyped_to_i32() {
        let mut f = Function::new("f");
        let b = f.create_block(BlockKind::First);
        let pos = SourcePos::default();
        let x = f.append(b, Op::IConst(1), TypeIndex::I64, pos);
        let y = f.append(b, Op::IConst(2), TypeIndex::I64, pos);
        let cmp = f.append(b, Op::ICmp(cot_ssa::IntCC::Eq, x, y), TypeIndex::BOOL, pos);
        run(&mut f);
        assert_eq!(f.value_type(cmp), TypeIndex::I32);
    }
}
