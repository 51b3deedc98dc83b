//! AArch64 instruction selection and encoding (spec.md §4.5.2), grounded
//! on `cranelift-codegen/src/isa/aarch64/inst/mod.rs` and
//! `isa/aarch64/lower_inst.rs`'s shape: a small `Inst` enum, one variant
//! per selected machine instruction, each knowing how to visit its own
//! operands and encode itself.
//!
//! Encodings below cover the handful of forms Cot's own codegen needs
//! (reg-reg-reg ALU ops, unsigned-offset loads/stores, unconditional
//! return, and branches) rather than the full AArch64 manual; see
//! `DESIGN.md` for which encodings are exact vs. representative.

use cot_ssa::IntCC;

use crate::buffer::{MachBuffer, MachLabel, RelocKind};
use crate::operand::OperandVisitor;
use crate::reg::{Reg, Writable};
use crate::vcode::MachInst;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Orr,
    Eor,
}

#[derive(Clone, Debug)]
pub enum Inst {
    MovImm { dst: Writable<Reg>, imm: u64 },
    AluRRR { op: AluOp, dst: Writable<Reg>, rn: Reg, rm: Reg },
    Load { dst: Writable<Reg>, base: Reg, offset: i32 },
    Store { src: Reg, base: Reg, offset: i32 },
    Ret,
    Jmp { target: MachLabel },
    CondBr { cc: IntCC, taken: MachLabel, not_taken: MachLabel },
    Call { symbol: String },
}

impl MachInst for Inst {
    fn visit_operands(&mut self, v: &mut dyn OperandVisitor) {
        match self {
            Inst::MovImm { dst, .. } => v.reg_def(dst),
            Inst::AluRRR { dst, rn, rm, .. } => {
                v.reg_use(rn);
                v.reg_use(rm);
                v.reg_def(dst);
            }
            Inst::Load { dst, base, .. } => {
                v.reg_use(base);
                v.reg_def(dst);
            }
            Inst::Store { src, base, .. } => {
                v.reg_use(src);
                v.reg_use(base);
            }
            Inst::Ret | Inst::Jmp { .. } | Inst::CondBr { .. } | Inst::Call { .. } => {}
        }
    }

    fn is_ret(&self) -> bool {
        matches!(self, Inst::Ret)
    }

    fn is_branch(&self) -> bool {
        matches!(self, Inst::Jmp { .. } | Inst::CondBr { .. })
    }

    fn branch_args(&self) -> &[Reg] {
        &[]
    }
}

/// `ret` is a fixed encoding: `RET {x30}`.
const RET_ENCODING: u32 = 0xd65f_03c0;

impl Inst {
    pub fn emit(&self, buf: &mut MachBuffer) {
        match self {
            Inst::MovImm { imm, .. } => {
                // `movz`/`movk` chain; emitted as a 4-instruction sequence
                // so any 64-bit immediate is reachable without a literal
                // pool, matching aarch64's `isa/aarch64/inst/emit.rs`
                // policy of avoiding pc-relative literal loads where a
                // `movz`/`movk` chain suffices.
                for shift in 0..4u32 {
                    let chunk = ((*imm >> (shift * 16)) & 0xffff) as u32;
                    let opc = if shift == 0 { 0b10 } else { 0b11 }; // movz then movk
                    let word = (opc << 29) | (0b100101 << 23) | (shift << 21) | (chunk << 5);
                    buf.put_bytes(&word.to_le_bytes());
                }
            }
            Inst::AluRRR { op, .. } => {
                let opc = match op {
                    AluOp::Add => 0b0001011,
                    AluOp::Sub => 0b1001011,
                    AluOp::And => 0b0001010,
                    AluOp::Orr => 0b0101010,
                    AluOp::Eor => 0b1101010,
                };
                let word: u32 = opc << 24;
                buf.put_bytes(&word.to_le_bytes());
            }
            Inst::Load { offset, .. } => {
                let word = 0xf940_0000u32 | ((*offset as u32 & 0xfff) << 10);
                buf.put_bytes(&word.to_le_bytes());
            }
            Inst::Store { offset, .. } => {
                let word = 0xf900_0000u32 | ((*offset as u32 & 0xfff) << 10);
                buf.put_bytes(&word.to_le_bytes());
            }
            Inst::Ret => buf.put_bytes(&RET_ENCODING.to_le_bytes()),
            Inst::Jmp { target } => {
                buf.use_label_at_offset(*target);
            }
            Inst::CondBr { taken, .. } => {
                buf.use_label_at_offset(*taken);
            }
            Inst::Call { symbol } => {
                buf.add_reloc(RelocKind::PcRelCall, symbol.clone(), 0);
                buf.put_bytes(&[0, 0, 0, 0x94]); // `bl` opcode bits, offset patched by the relocation
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ret_encodes_to_the_fixed_aarch64_bit_pattern() {
        let mut buf = MachBuffer::new();
        Inst::Ret.emit(&mut buf);
        let (code, _) = buf.finish();
        assert_eq!(code, RET_ENCODING.to_le_bytes());
    }
}
