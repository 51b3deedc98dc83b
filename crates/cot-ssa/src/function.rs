//! The `Function` container: blocks, values, and the edges between blocks.
//!
//! Structurally this plays the role Cranelift splits across `DataFlowGraph`
//! + `Layout`: here both live directly on `Function` because Cot's SSA layer
//! doesn't need a separate program-point ordering until `schedule` assigns
//! one (see `cot-opt::schedule`).

use cranelift_entity::PrimaryMap;

use crate::entities::{Block, StringLit, Value};
use crate::op::Op;
use crate::types::{TypeIndex, TypeRegistry};

#[cfg(feature = "enable-serde")]
use serde_derive::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SourcePos {
    pub file: u32,
    pub line: u32,
    pub col: u32,
}

/// Coarse block classification used by the Wasm `layout` pass to decide how
/// to nest `block`/`loop`/`if` (spec.md §4.2 step 6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum BlockKind {
    /// Function entry.
    First,
    Plain,
    /// Head of a two-way branch (`Brif` terminator).
    If,
    /// Terminates with `Return`.
    Ret,
    /// Single-back-edge loop header, tagged by `layout`'s natural-loop scan.
    Loop,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
struct ValueData {
    op: Op,
    ty: TypeIndex,
    uses: u32,
    block: Block,
    pos: SourcePos,
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
struct BlockData {
    kind: Option<BlockKind>,
    values: Vec<Value>,
    /// `(predecessor, index-of-this-edge-in-predecessor's-succs)`.
    preds: Vec<(Block, usize)>,
    /// `(successor, index-of-this-edge-in-successor's-preds)`.
    succs: Vec<(Block, usize)>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Function {
    pub name: String,
    pub types: TypeRegistry,
    pub param_types: Vec<TypeIndex>,
    pub ret_type: TypeIndex,
    pub entry: Option<Block>,
    blocks: PrimaryMap<Block, BlockData>,
    values: PrimaryMap<Value, ValueData>,
    literals: PrimaryMap<StringLit, String>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            types: TypeRegistry::new(),
            param_types: Vec::new(),
            ret_type: TypeIndex::VOID,
            entry: None,
            blocks: PrimaryMap::new(),
            values: PrimaryMap::new(),
            literals: PrimaryMap::new(),
        }
    }

    pub fn create_block(&mut self, kind: BlockKind) -> Block {
        let b = self.blocks.push(BlockData { kind: Some(kind), ..Default::default() });
        if self.entry.is_none() {
            self.entry = Some(b);
        }
        b
    }

    pub fn intern_string(&mut self, s: impl Into<String>) -> StringLit {
        self.literals.push(s.into())
    }

    pub fn string_literal(&self, lit: StringLit) -> &str {
        &self.literals[lit]
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.keys()
    }

    pub fn block_kind(&self, b: Block) -> BlockKind {
        self.blocks[b].kind.unwrap_or(BlockKind::Plain)
    }

    pub fn set_block_kind(&mut self, b: Block, kind: BlockKind) {
        self.blocks[b].kind = Some(kind);
    }

    pub fn block_values(&self, b: Block) -> &[Value] {
        &self.blocks[b].values
    }

    /// Overwrites `b`'s value order (same set of values, new sequence).
    /// Used by `schedule`, which reorders values within a block without
    /// changing which block owns them.
    pub fn set_block_values(&mut self, b: Block, values: Vec<Value>) {
        #[cfg(debug_assertions)]
        {
            let mut before = self.blocks[b].values.clone();
            let mut after = values.clone();
            before.sort();
            after.sort();
            debug_assert_eq!(before, after, "set_block_values must not change the value set");
        }
        self.blocks[b].values = values;
    }

    pub fn preds(&self, b: Block) -> &[(Block, usize)] {
        &self.blocks[b].preds
    }

    pub fn succs(&self, b: Block) -> &[(Block, usize)] {
        &self.blocks[b].succs
    }

    pub fn terminator(&self, b: Block) -> Option<Value> {
        self.blocks[b].values.last().copied().filter(|v| self.values[*v].op.is_terminator())
    }

    pub fn value_op(&self, v: Value) -> &Op {
        &self.values[v].op
    }

    pub fn value_type(&self, v: Value) -> TypeIndex {
        self.values[v].ty
    }

    pub fn value_uses(&self, v: Value) -> u32 {
        self.values[v].uses
    }

    pub fn value_block(&self, v: Value) -> Block {
        self.values[v].block
    }

    pub fn value_pos(&self, v: Value) -> SourcePos {
        self.values[v].pos
    }

    /// Appends a new value/instruction to `block`, bumping the `uses`
    /// counter of every value `op` reads and wiring CFG edges if `op` is a
    /// terminator (spec.md §8 invariants 1 and 2).
    pub fn append(&mut self, block: Block, op: Op, ty: TypeIndex, pos: SourcePos) -> Value {
        op.for_each_value(|arg| self.values[arg].uses += 1);
        let is_term = op.is_terminator();
        let v = self.values.push(ValueData { op: op.clone(), ty, uses: 0, block, pos });
        self.blocks[block].values.push(v);
        if is_term {
            self.wire_terminator(block, &op);
        }
        v
    }

    fn wire_terminator(&mut self, from: Block, op: &Op) {
        use crate::op::Op::*;
        match op {
            Jump(bc) => {
                self.add_edge(from, bc.block);
            }
            Brif { then, else_, .. } => {
                self.add_edge(from, then.block);
                self.add_edge(from, else_.block);
            }
            Switch { cases, default, .. } => {
                for (_, bc) in cases {
                    self.add_edge(from, bc.block);
                }
                self.add_edge(from, default.block);
            }
            Return(_) | Unreachable => {}
            _ => unreachable!("wire_terminator called on non-terminator"),
        }
    }

    fn add_edge(&mut self, from: Block, to: Block) {
        let succ_idx = self.blocks[from].succs.len();
        let pred_idx = self.blocks[to].preds.len();
        self.blocks[from].succs.push((to, pred_idx));
        self.blocks[to].preds.push((from, succ_idx));
    }

    /// Changes the result type of an existing value in place, e.g. when
    /// `lower_wasm` retypes a comparison's `bool` result to Wasm's `i32`.
    pub fn retype(&mut self, v: Value, ty: TypeIndex) {
        self.values[v].ty = ty;
    }

    /// Inserts a new non-terminator value directly before `before` in its
    /// own block. Used by rewrite passes that need to materialize operands
    /// for a replacement op (e.g. `rewritegeneric` splitting `const_string`
    /// into an address and a length ahead of the `string_make` that
    /// replaces it).
    pub fn insert_before(&mut self, before: Value, op: Op, ty: TypeIndex, pos: SourcePos) -> Value {
        debug_assert!(!op.is_terminator());
        op.for_each_value(|arg| self.values[arg].uses += 1);
        let block = self.values[before].block;
        let v = self.values.push(ValueData { op, ty, uses: 0, block, pos });
        let values = &mut self.blocks[block].values;
        let at = values.iter().position(|&x| x == before).expect("before must be in its block");
        values.insert(at, v);
        v
    }

    /// Replace `op` at `v` with a new op, fixing up use counts for both the
    /// values the old op referenced and the ones the new op references.
    /// Must not be called on/with a terminator — terminator rewrites need
    /// edge bookkeeping that callers should do explicitly (rewrites in
    /// practice only ever retarget non-terminator ops).
    pub fn set_op(&mut self, v: Value, new_op: Op) {
        let old_op = self.values[v].op.clone();
        debug_assert!(!old_op.is_terminator() && !new_op.is_terminator());
        old_op.for_each_value(|arg| self.values[arg].uses -= 1);
        new_op.for_each_value(|arg| self.values[arg].uses += 1);
        self.values[v].op = new_op;
    }

    /// Rewrites every occurrence of `old` to `new` across the whole
    /// function (used by `rewritedec`'s `copy` propagation). Returns the
    /// number of occurrences replaced.
    pub fn replace_all_uses(&mut self, old: Value, new: Value) -> u32 {
        let mut replaced = 0u32;
        let value_ids: Vec<Value> = self.values.keys().collect();
        for id in value_ids {
            let mut op = self.values[id].op.clone();
            let mut hit = false;
            replace_in_op(&mut op, old, new, &mut hit);
            if hit {
                let count = count_occurrences(&op, new) - count_occurrences(&self.values[id].op, new);
                self.values[id].op = op;
                replaced += count.max(0) as u32;
            }
        }
        self.values[old].uses = self.values[old].uses.saturating_sub(replaced);
        self.values[new].uses += replaced;
        replaced
    }

    pub fn dump(&self) -> String {
        let mut out = format!("function {}() {{\n", self.name);
        for b in self.blocks() {
            out.push_str(&format!("  {}({:?}):\n", b, self.block_kind(b)));
            for &v in self.block_values(b) {
                out.push_str(&format!("    {} = {:?}\n", v, self.value_op(v)));
            }
        }
        out.push_str("}\n");
        out
    }
}

fn count_occurrences(op: &Op, needle: Value) -> i64 {
    let mut n = 0i64;
    op.for_each_value(|v| {
        if v == needle {
            n += 1;
        }
    });
    n
}

/// Walks `op`'s operand positions, replacing `old` with `new` wherever it
/// appears. There's no generated `map_values_mut` (unlike Cranelift's
/// `InstructionData`), so this mirrors `for_each_value`'s match arms with
/// `&mut` bindings instead of a callback.
fn replace_in_op(op: &mut Op, old: Value, new: Value, hit: &mut bool) {
    use crate::op::Op::*;
    let mut sub = |v: &mut Value| {
        if *v == old {
            *v = new;
            *hit = true;
        }
    };
    match op {
        Param(_) | IConst(_) | FConst(_) | BoolConst(_) | ConstString(_) | LocalAddr { .. }
        | GlobalAddr { .. } | MetadataAddr { .. } | Unreachable | WasmIConst64(_)
        | WasmIConst32(_) => {}
        StringMake { ptr, len } => {
            sub(ptr);
            sub(len);
        }
        SliceMake { ptr, len, cap } => {
            sub(ptr);
            sub(len);
            sub(cap);
        }
        IAdd(a, b) | ISub(a, b) | IMul(a, b) | SDiv(a, b) | UDiv(a, b) | SRem(a, b)
        | URem(a, b) | And(a, b) | Or(a, b) | Xor(a, b) | Shl(a, b) | ShrS(a, b)
        | ShrU(a, b) | FAdd(a, b) | FSub(a, b) | FMul(a, b) | FDiv(a, b)
        | WasmI64Add(a, b) | WasmI32Add(a, b) => {
            sub(a);
            sub(b);
        }
        ICmp(_, a, b) | FCmp(_, a, b) => {
            sub(a);
            sub(b);
        }
        INeg(v) | FNeg(v) | IntCast { value: v, .. } | Truncate { value: v, .. }
        | BitCast { value: v, .. } | IntToFloat { value: v, .. }
        | FloatToInt { value: v, .. } | SlicePtr(v) | SliceLen(v) | SliceCap(v)
        | StringPtr(v) | StringLen(v) | Copy(v) | Retain(v) | Release(v)
        | WasmI32WrapI64(v) | WasmI64ExtendI32 { value: v, .. } => sub(v),
        FieldAddr { base, .. } => sub(base),
        Load { addr, .. } => sub(addr),
        Store { addr, value } => {
            sub(addr);
            sub(value);
        }
        Call { args, .. } | StaticCall { args, .. } | Return(args) | Phi(args) => {
            for a in args {
                sub(a);
            }
        }
        CallIndirect { callee_addr, args, .. } => {
            sub(callee_addr);
            for a in args {
                sub(a);
            }
        }
        Jump(bc) => {
            for a in &mut bc.args {
                sub(a);
            }
        }
        Brif { cond, then, else_ } => {
            sub(cond);
            for a in &mut then.args {
                sub(a);
            }
            for a in &mut else_.args {
                sub(a);
            }
        }
        Switch { value, cases, default } => {
            sub(value);
            for (_, bc) in cases {
                for a in &mut bc.args {
                    sub(a);
                }
            }
            for a in &mut default.args {
                sub(a);
            }
        }
        Alloc { size, .. } => sub(size),
        DeinitCall { this, .. } => sub(this),
        CondSelect { then, else_, cond } | WasmSelect { then, else_, cond } => {
            sub(then);
            sub(else_);
            sub(cond);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;

    #[test]
    fn edges_are_symmetric() {
        let mut f = Function::new("f");
        let entry = f.create_block(BlockKind::First);
        let ret_block = f.create_block(BlockKind::Ret);
        let pos = SourcePos::default();
        let c = f.append(entry, Op::IConst(1), TypeIndex::BOOL, pos);
        f.append(
            entry,
            Op::Brif {
                cond: c,
                then: crate::op::BlockCall { block: ret_block, args: vec![] },
                else_: crate::op::BlockCall { block: ret_block, args: vec![] },
            },
            TypeIndex::VOID,
            pos,
        );
        for (i, &(s, j)) in f.succs(entry).iter().enumerate() {
            assert_eq!(f.preds(s)[j], (entry, i));
        }
    }

    #[test]
    fn uses_counted_through_branch_args() {
        let mut f = Function::new("f");
        let entry = f.create_block(BlockKind::First);
        let target = f.create_block(BlockKind::Plain);
        let pos = SourcePos::default();
        let v = f.append(entry, Op::IConst(7), TypeIndex::I64, pos);
        f.append(
            entry,
            Op::Jump(crate::op::BlockCall { block: target, args: vec![v] }),
            TypeIndex::VOID,
            pos,
        );
        assert_eq!(f.value_uses(v), 1);
    }

    #[test]
    fn replace_all_uses_updates_counts() {
        let mut f = Function::new("f");
        let entry = f.create_block(BlockKind::First);
        let pos = SourcePos::default();
        let a = f.append(entry, Op::IConst(1), TypeIndex::I64, pos);
        let b = f.append(entry, Op::IConst(2), TypeIndex::I64, pos);
        let add = f.append(entry, Op::IAdd(a, a), TypeIndex::I64, pos);
        assert_eq!(f.value_uses(a), 2);
        f.replace_all_uses(a, b);
        assert_eq!(f.value_uses(a), 0);
        assert_eq!(f.value_uses(b), 2);
        assert!(matches!(f.value_op(add), Op::IAdd(x, y) if *x == b && *y == b));
    }
}
