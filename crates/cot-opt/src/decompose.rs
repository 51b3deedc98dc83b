//! `decompose`: split every phi whose type is a slice or string into
//! per-component (ptr/len[/cap]) phis plus a `slice_make`/`string_make`
//! that reconstructs the original value (spec.md §4.2 step 2). Required
//! because Wasm and the register allocator both expect scalar-typed
//! values.

use cot_ssa::{Function, Op, SourcePos, Type, TypeIndex, Value};

pub fn run(func: &mut Function) {
    let candidates: Vec<Value> = func
        .blocks()
        .flat_map(|b| func.block_values(b).to_vec())
        .filter(|&v| is_compound_phi(func, v))
        .collect();

    for v in candidates {
        decompose_one(func, v);
    }
}

fn is_compound_phi(func: &Function, v: Value) -> bool {
    if !func.value_op(v).is_phi() {
        return false;
    }
    let ty = func.value_type(v);
    func.types.is_string(ty) || matches!(func.types.lookup(ty), Type::Slice { .. })
}

fn decompose_one(func: &mut Function, v: Value) {
    let Op::Phi(args) = func.value_op(v).clone() else { unreachable!() };
    let ty = func.value_type(v);
    let is_string = func.types.is_string(ty);
    let pos = func.value_pos(v);

    // Extract the per-predecessor components right before each
    // predecessor's terminator so the extraction dominates the edge it
    // feeds.
    let mut ptr_args = Vec::with_capacity(args.len());
    let mut len_args = Vec::with_capacity(args.len());
    let mut cap_args = Vec::with_capacity(args.len());
    for &arg in &args {
        let block = func.value_block(arg);
        let term = func.terminator(block).expect("predecessor must end in a terminator");
        let ptr_op = if is_string { Op::StringPtr(arg) } else { Op::SlicePtr(arg) };
        let len_op = if is_string { Op::StringLen(arg) } else { Op::SliceLen(arg) };
        ptr_args.push(func.insert_before(term, ptr_op, TypeIndex::I64, pos));
        len_args.push(func.insert_before(term, len_op, TypeIndex::I64, pos));
        if !is_string {
            cap_args.push(func.insert_before(term, Op::SliceCap(arg), TypeIndex::I64, pos));
        }
    }

    let ptr_phi = func.insert_before(v, Op::Phi(ptr_args), TypeIndex::I64, pos);
    let len_phi = func.insert_before(v, Op::Phi(len_args), TypeIndex::I64, pos);
    if is_string {
        func.set_op(v, Op::StringMake { ptr: ptr_phi, len: len_phi });
    } else {
        let cap_phi = func.insert_before(v, Op::Phi(cap_args), TypeIndex::I64, pos);
        func.set_op(v, Op::SliceMake { ptr: ptr_phi, len: len_phi, cap: cap_phi });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ssa::{BlockCall, BlockKind};

    #[test]
    fn string_phi_decomposes_to_scalar_phis() {
        let mut f = Function::new("f");
        let entry = f.create_block(BlockKind::If);
        let left = f.create_block(BlockKind::Plain);
        let right = f.create_block(BlockKind::Plain);
        let join = f.create_block(BlockKind::Ret);
        let pos = SourcePos::default();

        let lit1 = f.intern_string("a");
        let lit2 = f.intern_string("bb");
        let s1 = f.append(left, Op::ConstString(lit1), TypeIndex::STRING, pos);
        let s2 = f.append(right, Op::ConstString(lit2), TypeIndex::STRING, pos);
        let cond = f.append(entry, Op::BoolConst(true), TypeIndex::BOOL, pos);
        f.append(
            entry,
            Op::Brif {
                cond,
                then: BlockCall { block: left, args: vec![] },
                else_: BlockCall { block: right, args: vec![] },
            },
            TypeIndex::VOID,
            pos,
        );
        f.append(left, Op::Jump(BlockCall { block: join, args: vec![s1] }), TypeIndex::VOID, pos);
        f.append(right, Op::Jump(BlockCall { block: join, args: vec![s2] }), TypeIndex::VOID, pos);
        let phi = f.append(join, Op::Phi(vec![s1, s2]), TypeIndex::STRING, pos);
        f.append(join, Op::Return(vec![phi]), TypeIndex::VOID, pos);

        run(&mut f);

        assert!(matches!(f.value_op(phi), Op::StringMake { .. }));
        for b in f.blocks() {
            for &v in f.block_values(b) {
                if let Op::Phi(_) = f.value_op(v) {
                    assert!(!f.types.is_string(f.value_type(v)));
                }
            }
        }
    }
}
