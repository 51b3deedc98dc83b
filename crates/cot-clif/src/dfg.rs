//! `DataFlowGraph`: owns every instruction, value, jump table, and
//! signature in a [`crate::function::Function`] (spec.md §3.2). Kept
//! separate from [`crate::layout::Layout`] — which only records block/inst
//! *ordering* — the way `cranelift-codegen/src/ir/dfg.rs` and `layout.rs`
//! are two different files: a pass that renumbers or splits blocks touches
//! the layout without having to touch value data, and vice versa. This is
//! a deliberate contrast with `cot_ssa::Function`, which merges both
//! concerns into one struct — CLIF is one level lower, with more passes
//! (legalization, regalloc prep) that only ever need one half of it.

use cranelift_entity::{PrimaryMap, SecondaryMap};

use crate::entities::{Block, FuncRef, GlobalValue, Inst, JumpTable, SigRef, Value};
use crate::inst::InstData;
use crate::jumptable::JumpTableData;
use crate::signature::Signature;
use crate::types::Type;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct ValueDef {
    ty: Type,
    origin: ValueOrigin,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum ValueOrigin {
    Result(Inst, u32),
    Param(Block, u32),
}

#[derive(Clone, Debug)]
struct InstEntry {
    data: InstData,
    results: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExtFuncData {
    pub name: String,
    pub signature: SigRef,
}

#[derive(Default)]
pub struct DataFlowGraph {
    values: PrimaryMap<Value, ValueDef>,
    insts: PrimaryMap<Inst, InstEntry>,
    block_params: SecondaryMap<Block, Vec<Value>>,
    jump_tables: PrimaryMap<JumpTable, JumpTableData>,
    signatures: PrimaryMap<SigRef, Signature>,
    ext_funcs: PrimaryMap<FuncRef, ExtFuncData>,
    global_values: PrimaryMap<GlobalValue, String>,
}

impl DataFlowGraph {
    pub fn new() -> DataFlowGraph {
        DataFlowGraph::default()
    }

    pub fn make_inst(&mut self, data: InstData) -> Inst {
        self.insts.push(InstEntry { data, results: Vec::new() })
    }

    pub fn inst_data(&self, inst: Inst) -> &InstData {
        &self.insts[inst].data
    }

    pub fn replace_inst(&mut self, inst: Inst, data: InstData) {
        self.insts[inst].data = data;
    }

    /// Appends a fresh result value of type `ty` to `inst` and returns it.
    pub fn append_result(&mut self, inst: Inst, ty: Type) -> Value {
        let n = self.insts[inst].results.len() as u32;
        let v = self.values.push(ValueDef { ty, origin: ValueOrigin::Result(inst, n) });
        self.insts[inst].results.push(v);
        v
    }

    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        &self.insts[inst].results
    }

    pub fn first_result(&self, inst: Inst) -> Value {
        self.insts[inst].results[0]
    }

    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let n = self.block_params[block].len() as u32;
        let v = self.values.push(ValueDef { ty, origin: ValueOrigin::Param(block, n) });
        self.block_params[block].push(v);
        v
    }

    pub fn block_params(&self, block: Block) -> &[Value] {
        &self.block_params[block]
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.values[value].ty
    }

    /// The block a value is a parameter of, or `None` if it's an
    /// instruction result.
    pub fn value_param_block(&self, value: Value) -> Option<Block> {
        match self.values[value].origin {
            ValueOrigin::Param(block, _) => Some(block),
            ValueOrigin::Result(..) => None,
        }
    }

    pub fn make_jump_table(&mut self, data: JumpTableData) -> JumpTable {
        self.jump_tables.push(data)
    }

    pub fn jump_table(&self, jt: JumpTable) -> &JumpTableData {
        &self.jump_tables[jt]
    }

    pub fn make_signature(&mut self, sig: Signature) -> SigRef {
        self.signatures.push(sig)
    }

    pub fn signature(&self, sig: SigRef) -> &Signature {
        &self.signatures[sig]
    }

    pub fn import_function(&mut self, data: ExtFuncData) -> FuncRef {
        self.ext_funcs.push(data)
    }

    pub fn ext_func(&self, f: FuncRef) -> &ExtFuncData {
        &self.ext_funcs[f]
    }

    pub fn make_global_value(&mut self, symbol: String) -> GlobalValue {
        self.global_values.push(symbol)
    }

    pub fn global_value_symbol(&self, gv: GlobalValue) -> &str {
        &self.global_values[gv]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn inst_results_and_block_params_are_independently_numbered() {
        let mut dfg = DataFlowGraph::new();
        let inst = dfg.make_inst(InstData::Iconst(1));
        let r = dfg.append_result(inst, Type::I64);
        assert_eq!(dfg.first_result(inst), r);
        assert_eq!(dfg.value_type(r), Type::I64);

        let block = Block::new(0);
        let p0 = dfg.append_block_param(block, Type::I32);
        let p1 = dfg.append_block_param(block, Type::I32);
        assert_eq!(dfg.block_params(block), &[p0, p1]);
    }

    #[test]
    fn jump_table_round_trips_through_the_dfg() {
        let mut dfg = DataFlowGraph::new();
        let jt = dfg.make_jump_table(JumpTableData::new(Block::new(0)));
        assert_eq!(dfg.jump_table(jt).default_block(), Block::new(0));
    }
}
