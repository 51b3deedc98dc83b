//! `rewritedec`: replace `slice_ptr(slice_make(p,l,c)) -> copy(p)` and the
//! analogous rules for `string_make` (loaded STRING values decompose as
//! slice, spec.md §4.2 step 4). Also rewrites `string_concat(s1,s2)` to
//! `static_call("cot_string_concat", ..) + string_make`.

use cot_ssa::{Function, Op, SourcePos, TypeIndex, Value};

pub fn run(func: &mut Function) {
    simplify_component_extraction(func);
    lower_string_concat(func);
}

fn simplify_component_extraction(func: &mut Function) {
    let targets: Vec<_> = func.blocks().flat_map(|b| func.block_values(b).to_vec()).collect();
    for v in targets {
        let replacement = match func.value_op(v) {
            Op::SlicePtr(inner) => make_component(func, *inner, Component::Ptr),
            Op::SliceLen(inner) => make_component(func, *inner, Component::Len),
            Op::SliceCap(inner) => make_component(func, *inner, Component::Cap),
            Op::StringPtr(inner) => make_component(func, *inner, Component::Ptr),
            Op::StringLen(inner) => make_component(func, *inner, Component::Len),
            _ => None,
        };
        if let Some(component) = replacement {
            func.set_op(v, Op::Copy(component));
        }
    }
}

enum Component {
    Ptr,
    Len,
    Cap,
}

fn make_component(func: &Function, inner: Value, which: Component) -> Option<Value> {
    match (func.value_op(inner), which) {
        (Op::SliceMake { ptr, .. }, Component::Ptr) => Some(*ptr),
        (Op::SliceMake { len, .. }, Component::Len) => Some(*len),
        (Op::SliceMake { cap, .. }, Component::Cap) => Some(*cap),
        (Op::StringMake { ptr, .. }, Component::Ptr) => Some(*ptr),
        (Op::StringMake { len, .. }, Component::Len) => Some(*len),
        _ => None,
    }
}

/// `cot_string_concat(ptr1,len1,ptr2,len2) -> ptr_result`; the runtime
/// doesn't hand back a length, so the lowered form recomputes it as
/// `len1 + len2` and wraps both into a fresh `string_make`.
fn lower_string_concat(func: &mut Function) {
    let targets: Vec<_> = func
        .blocks()
        .flat_map(|b| func.block_values(b).to_vec())
        .filter(|&v| matches!(func.value_op(v), Op::Call { callee, .. } if callee == "string_concat"))
        .collect();

    for v in targets {
        let Op::Call { args, .. } = func.value_op(v).clone() else { unreachable!() };
        assert_eq!(args.len(), 2, "string_concat takes exactly two strings");
        let (s1, s2) = (args[0], args[1]);
        let pos: SourcePos = func.value_pos(v);

        let ptr1 = func.insert_before(v, Op::StringPtr(s1), TypeIndex::I64, pos);
        let len1 = func.insert_before(v, Op::StringLen(s1), TypeIndex::I64, pos);
        let ptr2 = func.insert_before(v, Op::StringPtr(s2), TypeIndex::I64, pos);
        let len2 = func.insert_before(v, Op::StringLen(s2), TypeIndex::I64, pos);
        let result_ptr = func.insert_before(
            v,
            Op::StaticCall { callee: "cot_string_concat".into(), args: vec![ptr1, len1, ptr2, len2] },
            TypeIndex::I64,
            pos,
        );
        let result_len = func.insert_before(v, Op::IAdd(len1, len2), TypeIndex::I64, pos);
        func.set_op(v, Op::StringMake { ptr: result_ptr, len: result_len });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ssa::BlockKind;

    #[test]
    fn slice_ptr_of_slice_make_becomes_copy() {
        let mut f = Function::new("f");
        let b = f.create_block(BlockKind::First);
        let pos = SourcePos::default();
        let p = f.append(b, Op::IConst(100), TypeIndex::I64, pos);
        let l = f.append(b, Op::IConst(3), TypeIndex::I64, pos);
        let c = f.append(b, Op::IConst(3), TypeIndex::I64, pos);
        let made = f.append(b, Op::SliceMake { ptr: p, len: l, cap: c }, TypeIndex::STRING, pos);
        let ptr_of = f.append(b, Op::SlicePtr(made), TypeIndex::I64, pos);
        run(&mut f);
        assert!(matches!(f.value_op(ptr_of), Op::Copy(x) if *x == p));
    }

    #[test]
    fn string_concat_call_lowers_to_static_call() {
        let mut f = Function::new("f");
        let b = f.create_block(BlockKind::First);
        let pos = SourcePos::default();
        let p1 = f.append(b, Op::IConst(1), TypeIndex::I64, pos);
        let l1 = f.append(b, Op::IConst(1), TypeIndex::I64, pos);
        let s1 = f.append(b, Op::StringMake { ptr: p1, len: l1 }, TypeIndex::STRING, pos);
        let p2 = f.append(b, Op::IConst(2), TypeIndex::I64, pos);
        let l2 = f.append(b, Op::IConst(2), TypeIndex::I64, pos);
        let s2 = f.append(b, Op::StringMake { ptr: p2, len: l2 }, TypeIndex::STRING, pos);
        let call =
            f.append(b, Op::Call { callee: "string_concat".into(), args: vec![s1, s2] }, TypeIndex::STRING, pos);
        run(&mut f);
        assert!(matches!(f.value_op(call), Op::StringMake { .. }));
    }
}
