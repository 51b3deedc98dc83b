//! Instruction selection from CLIF into `cot-machinst`'s x86-64 VCode
//! (spec.md §4.5.2). Scoped to straight-line functions — one CLIF block,
//! arithmetic and a final `return` — the shapes scenarios S1–S3 actually
//! produce; anything with control flow, a call, or a memory access
//! returns [`IselError`] rather than guessing at a lowering, since calls
//! need an ABI-fixed result register this scope doesn't wire up and
//! branches need the block-edge machinery `cot-machinst::vcode` only
//! exercises through its own unit tests so far (see `DESIGN.md`).
//! Grounded on `cranelift-codegen/src/machinst/lower.rs`'s one-CLIF-inst
//! to N-MachInsts walk, narrowed to a single emit-per-inst mapping since
//! Cot doesn't need instruction combining (no "lower add+load into one
//! memory operand" style patterns) at this scope.

use std::collections::HashMap;

use cot_clif::{Function as ClifFunction, InstData, Value as ClifValue};
use cot_machinst::isa::x64::{AluOp, Inst};
use cot_machinst::{Reg, VCode, Writable};
use regalloc2::{RegClass, VReg};

#[derive(Debug)]
pub struct IselError(pub String);

impl std::fmt::Display for IselError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "instruction selection failed: {}", self.0)
    }
}

impl std::error::Error for IselError {}

fn produces_result(data: &InstData) -> bool {
    matches!(data, InstData::Iconst(_) | InstData::Iadd(..) | InstData::Isub(..) | InstData::Band(..) | InstData::Bor(..) | InstData::Bxor(..))
}

/// Selects `func` into a [`VCode`] ready for register allocation.
/// Requires exactly one block ending in `return`.
pub fn select_function(func: &ClifFunction) -> Result<VCode<Inst>, IselError> {
    let mut blocks = func.layout.blocks();
    let entry = blocks.next().ok_or_else(|| IselError("function has no blocks".into()))?;
    if blocks.next().is_some() {
        return Err(IselError("multi-block functions aren't instruction-selected yet".into()));
    }

    let params = func.dfg.block_params(entry);
    let num_vregs = params.len() + func.layout.block_insts(entry).iter().filter(|&&i| produces_result(func.dfg.inst_data(i))).count();

    let mut vcode: VCode<Inst> = VCode::new(num_vregs);
    let mut vregs: HashMap<ClifValue, VReg> = HashMap::new();
    let mut next_vreg = 0usize;

    let param_vregs: Vec<VReg> = params
        .iter()
        .map(|&p| {
            let v = VReg::new(next_vreg, RegClass::Int);
            next_vreg += 1;
            vregs.insert(p, v);
            v
        })
        .collect();
    let block = vcode.start_block(entry, param_vregs);

    for &inst in func.layout.block_insts(entry) {
        let data = func.dfg.inst_data(inst).clone();
        select_inst(func, &data, inst, &mut vregs, &mut next_vreg, &mut vcode, block)?;
    }

    Ok(vcode)
}

fn vreg_of(v: ClifValue, vregs: &mut HashMap<ClifValue, VReg>, next_vreg: &mut usize) -> VReg {
    *vregs.entry(v).or_insert_with(|| {
        let r = VReg::new(*next_vreg, RegClass::Int);
        *next_vreg += 1;
        r
    })
}

fn select_inst(
    func: &ClifFunction,
    data: &InstData,
    inst: cot_clif::Inst,
    vregs: &mut HashMap<ClifValue, VReg>,
    next_vreg: &mut usize,
    vcode: &mut VCode<Inst>,
    block: usize,
) -> Result<(), IselError> {
    match data {
        InstData::Iconst(imm) => {
            let result = func.dfg.first_result(inst);
            let dst = vreg_of(result, vregs, next_vreg);
            vcode.push_inst(block, Inst::MovImm { dst: Writable::from_reg(Reg::Virtual(dst)), imm: *imm as u64 });
        }
        InstData::Iadd(a, b) | InstData::Isub(a, b) | InstData::Band(a, b) | InstData::Bor(a, b) | InstData::Bxor(a, b) => {
            let op = match data {
                InstData::Iadd(..) => AluOp::Add,
                InstData::Isub(..) => AluOp::Sub,
                InstData::Band(..) => AluOp::And,
                InstData::Bor(..) => AluOp::Or,
                InstData::Bxor(..) => AluOp::Xor,
                _ => unreachable!(),
            };
            let rn = Reg::Virtual(vreg_of(*a, vregs, next_vreg));
            let rm = Reg::Virtual(vreg_of(*b, vregs, next_vreg));
            let result = func.dfg.first_result(inst);
            let dst = vreg_of(result, vregs, next_vreg);
            vcode.push_inst(block, Inst::AluRRR { op, dst: Writable::from_reg(Reg::Virtual(dst)), rn, rm });
        }
        InstData::Return(vals) => {
            if vals.len() > 1 {
                return Err(IselError("multi-value return isn't instruction-selected yet".into()));
            }
            vcode.push_inst(block, Inst::Ret);
        }
        other => return Err(IselError(format!("unsupported instruction for native isel: {other:?}"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_clif::{CallConv, EntityRef, Function, InstData, Signature, Type};
    use regalloc2::Function as RegallocFunction;

    #[test]
    fn a_straight_line_add_selects_into_three_instructions() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(cot_clif::AbiParam::new(Type::I64));
        sig.returns.push(cot_clif::AbiParam::new(Type::I64));
        let mut f = Function::new("add_one", sig);
        let entry = f.create_block();
        let p = f.dfg.append_block_param(entry, Type::I64);
        let one = f.append_inst_result(entry, InstData::Iconst(1), Type::I64);
        let sum = f.append_inst_result(entry, InstData::Iadd(p, one), Type::I64);
        f.append_inst(entry, InstData::Return(vec![sum]));

        let vcode = select_function(&f).unwrap();
        assert_eq!(vcode.num_insts(), 3);
        assert_eq!(vcode.num_vregs(), 2); // the param and the `1` constant
    }

    #[test]
    fn a_call_is_rejected_for_now() {
        let sig = Signature::new(CallConv::SystemV);
        let mut f = Function::new("calls_out", sig);
        let entry = f.create_block();
        f.append_inst(entry, InstData::Call(cot_clif::FuncRef::new(0), vec![]));
        f.append_inst(entry, InstData::Return(vec![]));
        assert!(select_function(&f).is_err());
    }
}
