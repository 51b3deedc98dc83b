//! Entity references into a [`crate::dfg::DataFlowGraph`] and
//! [`crate::layout::Layout`], each a thin wrapper around a `u32` index via
//! `cranelift_entity::entity_impl!`.
//!
//! Modelled directly on
//! `cranelift-codegen/src/ir/entities.rs`.

use cranelift_entity::entity_impl;

/// A basic block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An SSA value: either the result of an instruction or a block parameter.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// A jump table, referenced from a `br_table` instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");

/// A stack slot: a chunk of the function's frame, addressed by
/// `stack_addr`/`stack_load`/`stack_store`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// A reference to a callee, as seen from `call`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// A reference to a [`crate::signature::Signature`], as seen from
/// `call_indirect`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// A global value: a symbol address or a derived pointer, used for ARC
/// metadata tables and statically allocated data.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalValue(u32);
entity_impl!(GlobalValue, "gv");

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn entities_round_trip_through_their_index() {
        let b = Block::new(3);
        assert_eq!(b.index(), 3);
        assert_eq!(format!("{b}"), "block3");
    }
}
