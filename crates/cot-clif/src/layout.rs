//! `Layout`: the order blocks and instructions appear in, kept apart from
//! [`crate::dfg::DataFlowGraph`] so reordering passes don't have to touch
//! value data (spec.md §3.2). Modelled on
//! `cranelift-codegen/src/ir/layout.rs`, but backed by plain `Vec`s rather
//! than an intrusive doubly-linked list — all a CLIF pass needs from this
//! layer is "what's the block/inst order" and "is A before B", and a `Vec`
//! answers both with an index lookup instead of pointer-chasing, at the
//! cost of O(n) insertion. Cot functions are small enough that this
//! doesn't matter in practice.

use std::collections::HashMap;

use crate::entities::{Block, Inst};

#[derive(Default)]
pub struct Layout {
    blocks: Vec<Block>,
    block_insts: HashMap<Block, Vec<Inst>>,
    inst_block: HashMap<Inst, Block>,
}

impl Layout {
    pub fn new() -> Layout {
        Layout::default()
    }

    pub fn append_block(&mut self, block: Block) {
        self.blocks.push(block);
        self.block_insts.entry(block).or_default();
    }

    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        self.block_insts.entry(block).or_default().push(inst);
        self.inst_block.insert(inst, block);
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.iter().copied()
    }

    pub fn block_insts(&self, block: Block) -> &[Inst] {
        self.block_insts.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.inst_block.get(&inst).copied()
    }

    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.block_insts(block).last().copied()
    }

    /// Program-point ordering: does `a` come strictly before `b`, scanning
    /// blocks in layout order and instructions within each block in layout
    /// order. Used by liveness/regalloc prep, which only ever compares
    /// points within the same function.
    pub fn is_before(&self, a: Inst, b: Inst) -> bool {
        let block_a = self.inst_block(a);
        let block_b = self.inst_block(b);
        if block_a != block_b {
            let order: HashMap<Block, usize> = self.blocks.iter().enumerate().map(|(i, &b)| (b, i)).collect();
            return match (block_a, block_b) {
                (Some(ba), Some(bb)) => order[&ba] < order[&bb],
                _ => false,
            };
        }
        let Some(block) = block_a else { return false };
        let insts = self.block_insts(block);
        let pos_a = insts.iter().position(|&i| i == a);
        let pos_b = insts.iter().position(|&i| i == b);
        matches!((pos_a, pos_b), (Some(pa), Some(pb)) if pa < pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn insts_come_out_in_append_order_within_a_block() {
        let mut layout = Layout::new();
        let b0 = Block::new(0);
        layout.append_block(b0);
        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        layout.append_inst(i0, b0);
        layout.append_inst(i1, b0);

        assert_eq!(layout.block_insts(b0), &[i0, i1]);
        assert!(layout.is_before(i0, i1));
        assert!(!layout.is_before(i1, i0));
    }

    #[test]
    fn cross_block_ordering_follows_block_layout_order() {
        let mut layout = Layout::new();
        let b0 = Block::new(0);
        let b1 = Block::new(1);
        layout.append_block(b0);
        layout.append_block(b1);
        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        layout.append_inst(i0, b0);
        layout.append_inst(i1, b1);

        assert!(layout.is_before(i0, i1));
    }
}
