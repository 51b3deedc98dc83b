//! Jump table data for `br_table` (spec.md §3.2).
//!
//! Diverges from `cranelift-codegen/src/ir/jumptable.rs`'s plain
//! `table: Vec<Block>` (where Cranelift's `br_table` carries its own
//! separate default-destination operand on the instruction): the spec
//! describes the default target as living inside the table itself, so here
//! `table[0]` is always the default and `table[1..]` are the indexed arms.

use crate::entities::Block;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JumpTableData {
    table: Vec<Block>,
}

impl JumpTableData {
    /// Builds a table whose default arm is `default`, with no indexed
    /// arms yet.
    pub fn new(default: Block) -> JumpTableData {
        JumpTableData { table: vec![default] }
    }

    pub fn push_arm(&mut self, block: Block) {
        self.table.push(block);
    }

    pub fn default_block(&self) -> Block {
        self.table[0]
    }

    /// Indexed arms, excluding the default at slot 0.
    pub fn arms(&self) -> &[Block] {
        &self.table[1..]
    }

    pub fn len(&self) -> usize {
        self.table.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All blocks this table can branch to, default included, each only
    /// once. Used by CFG-consuming passes (dominance, layout) that need
    /// successor edges rather than the index→arm mapping itself.
    pub fn branch_targets(&self) -> impl Iterator<Item = &Block> {
        self.table.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn slot_zero_is_the_default_arm() {
        let default = Block::new(0);
        let case1 = Block::new(1);
        let mut jt = JumpTableData::new(default);
        jt.push_arm(case1);
        jt.push_arm(Block::new(2));

        assert_eq!(jt.default_block(), default);
        assert_eq!(jt.arms(), &[case1, Block::new(2)]);
        assert_eq!(jt.len(), 2);
    }

    #[test]
    fn empty_table_has_only_a_default() {
        let jt = JumpTableData::new(Block::new(5));
        assert!(jt.is_empty());
        assert_eq!(jt.branch_targets().count(), 1);
    }
}
