//! A complete CLIF function: [`DataFlowGraph`] plus [`Layout`] plus the
//! pieces that are per-function rather than per-value (name, signature,
//! stack slots). Modelled on `cranelift-codegen/src/ir/function.rs`.

use cranelift_entity::{EntityRef, PrimaryMap};

use crate::dfg::DataFlowGraph;
use crate::entities::{Block, Inst, StackSlot};
use crate::inst::InstData;
use crate::layout::Layout;
use crate::signature::Signature;
use crate::types::Type;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StackSlotData {
    pub size: u32,
}

pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
    pub stack_slots: PrimaryMap<StackSlot, StackSlotData>,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature) -> Function {
        Function {
            name: name.into(),
            signature,
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
            stack_slots: PrimaryMap::new(),
        }
    }

    pub fn create_block(&mut self) -> Block {
        let block = Block::new(self.layout.blocks().count());
        self.layout.append_block(block);
        block
    }

    /// Appends an instruction with no result (a store, a terminator) to
    /// the end of `block`.
    pub fn append_inst(&mut self, block: Block, data: InstData) -> Inst {
        let inst = self.dfg.make_inst(data);
        self.layout.append_inst(inst, block);
        inst
    }

    /// Appends an instruction and gives it a single result of type `ty`.
    pub fn append_inst_result(&mut self, block: Block, data: InstData, ty: Type) -> crate::entities::Value {
        let inst = self.append_inst(block, data);
        self.dfg.append_result(inst, ty)
    }

    pub fn create_stack_slot(&mut self, size: u32) -> StackSlot {
        self.stack_slots.push(StackSlotData { size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::CallConv;

    #[test]
    fn building_a_two_block_function_wires_layout_and_dfg_together() {
        let mut f = Function::new("add_one", Signature::new(CallConv::SystemV));
        let entry = f.create_block();
        let p = f.dfg.append_block_param(entry, Type::I64);
        let one = f.append_inst_result(entry, InstData::Iconst(1), Type::I64);
        let sum = f.append_inst_result(entry, InstData::Iadd(p, one), Type::I64);
        f.append_inst(entry, InstData::Return(vec![sum]));

        assert_eq!(f.layout.block_insts(entry).len(), 3);
        assert_eq!(f.dfg.value_type(sum), Type::I64);
    }
}
