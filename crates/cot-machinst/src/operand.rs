//! `OperandVisitor`: every [`crate::inst::Inst`] implements this once, and
//! it's driven twice (spec.md §4.5.2's "double-use visitor"):
//!
//! 1. Before register allocation, to collect every register this
//!    instruction reads/writes/constrains into a flat `regalloc2::Operand`
//!    list (see [`crate::vcode::VCode`]'s `regalloc2::Function` impl).
//! 2. During emission, once `regalloc2::run` has produced an assignment,
//!    to rewrite each virtual register operand in place to the physical
//!    register the allocator chose, using the *same* traversal so the
//!    N-th operand collected in pass 1 lines up with the N-th rewrite in
//!    pass 2.
//!
//! Modelled on `cranelift-codegen/src/machinst/mod.rs`'s
//! `VCode`/`MachInst` operand-collection traits.

use regalloc2::{OperandConstraint, VReg};

use crate::reg::{Reg, Writable};

pub trait OperandVisitor {
    fn reg_use(&mut self, reg: &mut Reg);
    fn reg_def(&mut self, reg: &mut Writable<Reg>);
    fn reg_fixed_use(&mut self, reg: &mut Reg, physical: regalloc2::PReg);
}

/// Pass 1: gathers operands in traversal order for `regalloc2::Function`'s
/// `inst_operands`. Registers that are already physical (ABI-fixed
/// argument/return slots) are emitted as `OperandConstraint::FixedReg`
/// rather than left for the allocator to place.
pub struct CollectOperands {
    pub operands: Vec<regalloc2::Operand>,
}

impl CollectOperands {
    pub fn new() -> CollectOperands {
        CollectOperands { operands: Vec::new() }
    }
}

impl Default for CollectOperands {
    fn default() -> Self {
        Self::new()
    }
}

fn vreg_of(reg: Reg) -> VReg {
    match reg {
        Reg::Virtual(v) => v,
        Reg::Physical(p) => VReg::new(p.hw_enc() as usize, p.class()),
    }
}

impl OperandVisitor for CollectOperands {
    fn reg_use(&mut self, reg: &mut Reg) {
        self.operands.push(regalloc2::Operand::new(
            vreg_of(*reg),
            OperandConstraint::Any,
            regalloc2::OperandKind::Use,
            regalloc2::OperandPos::Early,
        ));
    }

    fn reg_def(&mut self, reg: &mut Writable<Reg>) {
        self.operands.push(regalloc2::Operand::new(
            vreg_of(reg.to_reg()),
            OperandConstraint::Any,
            regalloc2::OperandKind::Def,
            regalloc2::OperandPos::Late,
        ));
    }

    fn reg_fixed_use(&mut self, reg: &mut Reg, physical: regalloc2::PReg) {
        self.operands.push(regalloc2::Operand::new(
            vreg_of(*reg),
            OperandConstraint::FixedReg(physical),
            regalloc2::OperandKind::Use,
            regalloc2::OperandPos::Early,
        ));
    }
}

/// Pass 2: walks the same instruction with the allocator's chosen
/// assignment in hand and rewrites every virtual register to the physical
/// register `regalloc2` picked for it, in the same traversal order
/// `CollectOperands` used — this is what makes the two passes line up
/// without threading any extra bookkeeping through `Inst` itself.
pub struct ApplyAssignment<'a> {
    pub assignments: &'a [regalloc2::Allocation],
    pub next: usize,
}

impl<'a> ApplyAssignment<'a> {
    pub fn new(assignments: &'a [regalloc2::Allocation]) -> ApplyAssignment<'a> {
        ApplyAssignment { assignments, next: 0 }
    }

    fn take(&mut self) -> regalloc2::PReg {
        let alloc = self.assignments[self.next];
        self.next += 1;
        alloc.as_reg().expect("regalloc2 must assign a register, not a stack slot, for a reg operand")
    }
}

impl OperandVisitor for ApplyAssignment<'_> {
    fn reg_use(&mut self, reg: &mut Reg) {
        *reg = Reg::Physical(self.take());
    }

    fn reg_def(&mut self, reg: &mut Writable<Reg>) {
        *reg = Writable::from_reg(Reg::Physical(self.take()));
    }

    fn reg_fixed_use(&mut self, reg: &mut Reg, _physical: regalloc2::PReg) {
        *reg = Reg::Physical(self.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regalloc2::RegClass;

    #[test]
    fn collecting_a_use_then_a_def_produces_operands_in_order() {
        let mut c = CollectOperands::new();
        let mut u = Reg::Virtual(VReg::new(0, RegClass::Int));
        let mut d = Writable::from_reg(Reg::Virtual(VReg::new(1, RegClass::Int)));
        c.reg_use(&mut u);
        c.reg_def(&mut d);
        assert_eq!(c.operands.len(), 2);
        assert_eq!(c.operands[0].kind(), regalloc2::OperandKind::Use);
        assert_eq!(c.operands[1].kind(), regalloc2::OperandKind::Def);
    }
}
