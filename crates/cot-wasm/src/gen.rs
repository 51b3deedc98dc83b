//! `gen`: SSA values to a Wasm instruction stream, one function at a time
//! (spec.md §4.4.1).
//!
//! Each value maps to a sequence of instructions that leaves its result on
//! top of the operand stack, the way a classic expression-tree-to-stack-code
//! generator does: a value with exactly one use is recomputed inline at its
//! single consumer (nothing materialized); a value with more than one use,
//! or one with a side effect that must run at a fixed point regardless of
//! how many times its result is read, gets `local.tee`d into a dedicated
//! Wasm local the first time it's reached and `local.get` everywhere after.
//! Phi values are never computed at their own definition: every predecessor
//! writes the phi's local right before taking the edge into the block that
//! owns it (`gen_phi_handoffs`), since Wasm has no direct equivalent of a
//! join-point value.

use std::collections::{HashMap, HashSet};

use cranelift_entity::EntityRef;

use cot_ssa::{BasicType, Block, Function, Op, Type, TypeIndex, Value};

use crate::instr::{BlockType, MemArg, ValType, WasmInstr};

/// Resolved at module-link time (spec.md §4.4.1): `metadata_addr(name)`
/// needs the `FullMetadata` record's byte offset in the data section,
/// `global_addr(name)` needs the fixed linear-memory slot assigned to that
/// global.
#[derive(Default, Clone)]
pub struct LinkContext {
    pub metadata_offsets: HashMap<String, i64>,
    pub global_offsets: HashMap<String, i64>,
    /// Function-index map, assigned imports-first then runtime then user
    /// functions (spec.md §4.4.2) — built once by `link` and shared across
    /// every function's `gen` pass.
    pub func_indices: HashMap<String, u32>,
    /// Cumulative byte offsets of address-taken stack locals, summed from
    /// actual sizes rather than a fixed stride — STRING is 16 bytes, not 8
    /// (spec.md §4.4.1).
    pub local_slot_sizes: Vec<u32>,
}

impl LinkContext {
    fn local_addr_offset(&self, slot_index: u32) -> i32 {
        self.local_slot_sizes[..slot_index as usize].iter().sum::<u32>() as i32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenTerm {
    Jump(Block),
    Brif { then: Block, else_: Block },
    Switch { cases: Vec<(i64, Block)>, default: Block },
    Return,
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct GenBlock {
    pub instrs: Vec<WasmInstr>,
    pub term: GenTerm,
}

pub struct FuncGen<'a> {
    func: &'a Function,
    link: &'a LinkContext,
    param_locals: u32,
    next_local: u32,
    pub local_types: Vec<ValType>,
    materialized: HashMap<Value, u32>,
    done: HashSet<Value>,
    phi_locals: HashMap<Value, u32>,
}

impl<'a> FuncGen<'a> {
    pub fn new(func: &'a Function, link: &'a LinkContext) -> Self {
        let param_locals = func.param_types.len() as u32;
        let local_types: Vec<ValType> =
            func.param_types.iter().map(|&t| wasm_valtype(&func.types, t)).collect();
        let mut g = FuncGen {
            func,
            link,
            param_locals,
            next_local: param_locals,
            local_types,
            materialized: HashMap::new(),
            done: HashSet::new(),
            phi_locals: HashMap::new(),
        };
        g.preassign_phi_locals();
        g
    }

    fn preassign_phi_locals(&mut self) {
        for b in self.func.blocks() {
            for &v in self.func.block_values(b) {
                if self.func.value_op(v).is_phi() {
                    let slot = self.fresh_local(wasm_valtype(&self.func.types, self.func.value_type(v)));
                    self.phi_locals.insert(v, slot);
                }
            }
        }
    }

    fn fresh_local(&mut self, ty: ValType) -> u32 {
        let slot = self.next_local;
        self.next_local += 1;
        self.local_types.push(ty);
        slot
    }

    /// Locals declared beyond the function's own parameters, for the Wasm
    /// code section's local-declaration vector.
    pub fn declared_locals(&self) -> &[ValType] {
        &self.local_types[self.param_locals as usize..]
    }

    pub fn gen_function(&mut self) -> HashMap<Block, GenBlock> {
        let mut out = HashMap::new();
        for b in self.func.blocks() {
            out.insert(b, self.gen_block(b));
        }
        out
    }

    fn gen_block(&mut self, b: Block) -> GenBlock {
        let mut instrs = Vec::new();
        let values = self.func.block_values(b).to_vec();
        let term_value = self.func.terminator(b);
        for v in values {
            if Some(v) == term_value {
                continue;
            }
            let op = self.func.value_op(v).clone();
            if op.is_phi() {
                continue;
            }
            if self.materialized.contains_key(&v) || self.done.contains(&v) {
                continue;
            }
            if is_side_effecting(&op) || self.func.value_uses(v) == 0 {
                self.ensure(v, &mut instrs);
                if self.func.value_type(v) != TypeIndex::VOID
                    && self.func.value_uses(v) == 0
                    && !self.materialized.contains_key(&v)
                {
                    instrs.push(WasmInstr::Drop);
                }
            }
        }

        let term = match term_value.map(|v| self.func.value_op(v).clone()) {
            Some(Op::Jump(bc)) => {
                self.emit_phi_handoffs(b, bc.block, &mut instrs);
                GenTerm::Jump(bc.block)
            }
            Some(Op::Brif { cond, then, else_ }) => {
                self.ensure(cond, &mut instrs);
                // Phi handoffs for each arm are emitted by `preprocess` right
                // inside the matching `then`/`else` branch, since only one
                // side actually executes.
                let _ = (&then, &else_);
                GenTerm::Brif { then: then.block, else_: else_.block }
            }
            Some(Op::Switch { value, cases, default }) => {
                self.ensure(value, &mut instrs);
                GenTerm::Switch {
                    cases: cases.into_iter().map(|(k, bc)| (k, bc.block)).collect(),
                    default: default.block,
                }
            }
            Some(Op::Return(vals)) => {
                for v in vals {
                    self.ensure(v, &mut instrs);
                }
                GenTerm::Return
            }
            Some(Op::Unreachable) | None => GenTerm::Unreachable,
            Some(other) => unreachable!("not a terminator: {other:?}"),
        };

        GenBlock { instrs, term }
    }

    /// Phi values owned by `succ` get their predecessor-`pred`-specific
    /// value written into their local right before the jump. Only correct
    /// for unconditional edges (`Jump`); `Brif`/`Switch` arms have their own
    /// handoffs inserted structurally by `preprocess`, once it knows which
    /// successor is actually reached by which physical branch.
    fn emit_phi_handoffs(&mut self, pred: Block, succ: Block, out: &mut Vec<WasmInstr>) {
        let edge_idx = self
            .func
            .preds(succ)
            .iter()
            .position(|&(p, _)| p == pred)
            .expect("pred must be a predecessor of succ");
        let phi_values: Vec<Value> =
            self.func.block_values(succ).iter().copied().filter(|&v| self.func.value_op(v).is_phi()).collect();
        for v in phi_values {
            if let Op::Phi(args) = self.func.value_op(v).clone() {
                self.ensure(args[edge_idx], out);
                out.push(WasmInstr::LocalSet(self.phi_locals[&v]));
            }
        }
    }

    fn ensure(&mut self, v: Value, out: &mut Vec<WasmInstr>) {
        if let Some(&slot) = self.materialized.get(&v) {
            out.push(WasmInstr::LocalGet(slot));
            return;
        }
        if let Some(&slot) = self.phi_locals.get(&v) {
            out.push(WasmInstr::LocalGet(slot));
            return;
        }
        let op = self.func.value_op(v).clone();
        if let Op::Param(i) = op {
            out.push(WasmInstr::LocalGet(i));
            return;
        }
        if op.is_rematerializable() {
            self.emit_op(v, &op, out);
            return;
        }
        self.emit_op(v, &op, out);
        let needs_local = self.func.value_uses(v) > 1 || is_side_effecting(&op);
        if needs_local {
            if self.func.value_type(v) != TypeIndex::VOID {
                let slot = self.fresh_local(wasm_valtype(&self.func.types, self.func.value_type(v)));
                out.push(WasmInstr::LocalTee(slot));
                self.materialized.insert(v, slot);
            } else {
                self.done.insert(v);
            }
        }
    }

    fn emit_op(&mut self, v: Value, op: &Op, out: &mut Vec<WasmInstr>) {
        let ty = self.func.value_type(v);
        let wty = wasm_valtype(&self.func.types, ty);
        match op {
            Op::IConst(k) => out.push(const_for(wty, *k)),
            Op::WasmIConst32(k) => out.push(WasmInstr::I32Const(*k)),
            Op::WasmIConst64(k) => out.push(WasmInstr::I64Const(*k)),
            Op::FConst(bits) => match wty {
                ValType::F32 => out.push(WasmInstr::F32Const(f32::from_bits(*bits as u32))),
                _ => out.push(WasmInstr::F64Const(f64::from_bits(*bits))),
            },
            Op::BoolConst(b) => out.push(WasmInstr::I32Const(*b as i32)),
            Op::ConstString(_) => {
                // Eliminated by `rewritegeneric` before gen ever runs; a
                // surviving literal means the pipeline was skipped.
                unreachable!("const_string must be rewritten to string_make before codegen")
            }
            Op::StringMake { ptr, .. } | Op::SliceMake { ptr, .. } => self.ensure(*ptr, out),
            Op::Copy(src) => self.ensure(*src, out),
            Op::SlicePtr(s) | Op::StringPtr(s) => self.ensure(*s, out),
            Op::SliceLen(s) | Op::StringLen(s) => self.ensure(*s, out),
            Op::SliceCap(s) => self.ensure(*s, out),

            Op::IAdd(a, b) => self.binop(*a, *b, int_op(wty, "add"), out),
            Op::WasmI32Add(a, b) => self.binop(*a, *b, WasmInstr::I32Add, out),
            Op::WasmI64Add(a, b) => self.binop(*a, *b, WasmInstr::I64Add, out),
            Op::ISub(a, b) => self.binop(*a, *b, int_op(wty, "sub"), out),
            Op::IMul(a, b) => self.binop(*a, *b, int_op(wty, "mul"), out),
            Op::SDiv(a, b) => self.binop(*a, *b, int_op(wty, "div_s"), out),
            Op::UDiv(a, b) => self.binop(*a, *b, int_op(wty, "div_u"), out),
            Op::SRem(a, b) => self.binop(*a, *b, int_op(wty, "rem_s"), out),
            Op::URem(a, b) => self.binop(*a, *b, int_op(wty, "rem_u"), out),
            Op::And(a, b) => self.binop(*a, *b, int_op(wty, "and"), out),
            Op::Or(a, b) => self.binop(*a, *b, int_op(wty, "or"), out),
            Op::Xor(a, b) => self.binop(*a, *b, int_op(wty, "xor"), out),
            Op::Shl(a, b) => self.binop(*a, *b, int_op(wty, "shl"), out),
            Op::ShrS(a, b) => self.binop(*a, *b, int_op(wty, "shr_s"), out),
            Op::ShrU(a, b) => self.binop(*a, *b, int_op(wty, "shr_u"), out),
            Op::INeg(a) => {
                out.push(const_for(wty, 0));
                self.ensure(*a, out);
                out.push(int_op(wty, "sub"));
            }
            Op::FAdd(a, b) => self.binop_wty(*a, *b, float_op(wty, "add"), out),
            Op::FSub(a, b) => self.binop_wty(*a, *b, float_op(wty, "sub"), out),
            Op::FMul(a, b) => self.binop_wty(*a, *b, float_op(wty, "mul"), out),
            Op::FDiv(a, b) => self.binop_wty(*a, *b, float_op(wty, "div"), out),
            Op::FNeg(a) => {
                self.ensure(*a, out);
                out.push(if wty == ValType::F32 { WasmInstr::F32Neg } else { WasmInstr::F64Neg });
            }
            Op::ICmp(cc, a, b) => {
                let operand_wty = wasm_valtype(&self.func.types, self.func.value_type(*a));
                self.ensure(*a, out);
                self.ensure(*b, out);
                out.push(icmp_op(operand_wty, *cc));
            }
            Op::FCmp(cc, a, b) => {
                let operand_wty = wasm_valtype(&self.func.types, self.func.value_type(*a));
                self.ensure(*a, out);
                self.ensure(*b, out);
                out.push(fcmp_op(operand_wty, *cc));
            }

            Op::IntCast { value, to } | Op::BitCast { value, to } | Op::Truncate { value, to } => {
                let from = wasm_valtype(&self.func.types, self.func.value_type(*value));
                let target = wasm_valtype(&self.func.types, *to);
                self.ensure(*value, out);
                emit_int_conv(from, target, *value, &self.func.types, self.func.value_type(*value), out);
            }
            Op::IntToFloat { value, signed, to } => {
                self.ensure(*value, out);
                out.push(match (wasm_valtype(&self.func.types, *to), signed) {
                    (ValType::F64, true) => WasmInstr::F64ConvertI32S,
                    (ValType::F64, false) => WasmInstr::F64ConvertI32U,
                    _ => WasmInstr::F64ConvertI32S,
                });
            }
            Op::FloatToInt { value, signed, .. } => {
                self.ensure(*value, out);
                out.push(if *signed { WasmInstr::I32TruncF64S } else { WasmInstr::I32TruncF64U });
            }

            Op::LocalAddr { slot_index } => {
                out.push(WasmInstr::I32Const(self.link.local_addr_offset(*slot_index)));
            }
            Op::GlobalAddr { name } => {
                let off = self.link.global_offsets.get(name).copied().unwrap_or(0);
                out.push(WasmInstr::I32Const(off as i32));
            }
            Op::MetadataAddr { type_name } => {
                let off = self.link.metadata_offsets.get(type_name).copied().unwrap_or(0);
                out.push(WasmInstr::I64Const(off));
            }
            Op::FieldAddr { base, offset } => {
                self.ensure(*base, out);
                if *offset != 0 {
                    out.push(WasmInstr::I32Const(*offset as i32));
                    out.push(WasmInstr::I32Add);
                }
            }
            Op::Load { ty, addr } => {
                self.ensure(*addr, out);
                out.push(load_for(wasm_valtype(&self.func.types, *ty)));
            }
            Op::Store { addr, value } => {
                self.ensure(*addr, out);
                self.ensure(*value, out);
                out.push(store_for(wasm_valtype(&self.func.types, self.func.value_type(*value))));
            }

            Op::Call { callee, args } | Op::StaticCall { callee, args } => {
                for a in args {
                    self.ensure(*a, out);
                }
                out.push(WasmInstr::Call(self.func_index(callee)));
            }
            Op::CallIndirect { sig, callee_addr, args } => {
                for a in args {
                    self.ensure(*a, out);
                }
                self.ensure(*callee_addr, out);
                out.push(WasmInstr::CallIndirect { type_index: sig.index() as u32, table_index: 0 });
            }

            Op::Alloc { size, .. } => {
                self.ensure(*size, out);
                out.push(WasmInstr::Call(self.func_index("cot_alloc")));
            }
            Op::Retain(p) => {
                self.ensure(*p, out);
                out.push(WasmInstr::Call(self.func_index("cot_retain")));
            }
            Op::Release(p) => {
                self.ensure(*p, out);
                out.push(WasmInstr::Call(self.func_index("cot_release")));
            }
            Op::DeinitCall { callee, this } => {
                self.ensure(*this, out);
                out.push(WasmInstr::Call(self.func_index(callee)));
            }

            Op::CondSelect { then, else_, cond } | Op::WasmSelect { then, else_, cond } => {
                self.ensure(*then, out);
                self.ensure(*else_, out);
                self.ensure(*cond, out);
                out.push(WasmInstr::Select);
            }

            Op::WasmI32WrapI64(a) => {
                self.ensure(*a, out);
                out.push(WasmInstr::I32WrapI64);
            }
            Op::WasmI64ExtendI32 { value, signed } => {
                self.ensure(*value, out);
                out.push(if *signed { WasmInstr::I64ExtendI32S } else { WasmInstr::I64ExtendI32U });
            }

            Op::Phi(_) => unreachable!("phi handled via phi_locals"),
            Op::Param(_) => unreachable!("param handled in ensure"),
            Op::Jump(_) | Op::Brif { .. } | Op::Switch { .. } | Op::Return(_) | Op::Unreachable => {
                unreachable!("terminator must not reach emit_op")
            }
        }
    }

    fn binop(&mut self, a: Value, b: Value, instr: WasmInstr, out: &mut Vec<WasmInstr>) {
        self.ensure(a, out);
        self.ensure(b, out);
        out.push(instr);
    }

    fn binop_wty(&mut self, a: Value, b: Value, instr: WasmInstr, out: &mut Vec<WasmInstr>) {
        self.binop(a, b, instr, out)
    }

    fn func_index(&self, name: &str) -> u32 {
        *self.link.func_indices.get(name).unwrap_or_else(|| panic!("no function index for `{name}`"))
    }
}

fn is_side_effecting(op: &Op) -> bool {
    matches!(
        op,
        Op::Store { .. }
            | Op::Retain(_)
            | Op::Release(_)
            | Op::Alloc { .. }
            | Op::Call { .. }
            | Op::StaticCall { .. }
            | Op::CallIndirect { .. }
            | Op::DeinitCall { .. }
    )
}

pub fn wasm_valtype(types: &cot_ssa::TypeRegistry, ty: TypeIndex) -> ValType {
    match types.lookup(ty) {
        Type::Basic(BasicType::I64) | Type::Basic(BasicType::U64) => ValType::I64,
        Type::Basic(BasicType::F32) => ValType::F32,
        Type::Basic(BasicType::F64) => ValType::F64,
        _ => ValType::I32,
    }
}

fn const_for(wty: ValType, k: i64) -> WasmInstr {
    match wty {
        ValType::I64 => WasmInstr::I64Const(k),
        ValType::F32 => WasmInstr::F32Const(k as f32),
        ValType::F64 => WasmInstr::F64Const(k as f64),
        ValType::I32 => WasmInstr::I32Const(k as i32),
    }
}

fn int_op(wty: ValType, name: &str) -> WasmInstr {
    use WasmInstr::*;
    match (wty, name) {
        (ValType::I64, "add") => I64Add,
        (ValType::I64, "sub") => I64Sub,
        (ValType::I64, "mul") => I64Mul,
        (ValType::I64, "div_s") => I64DivS,
        (ValType::I64, "div_u") => I64DivU,
        (ValType::I64, "rem_s") => I64RemS,
        (ValType::I64, "rem_u") => I64RemU,
        (ValType::I64, "and") => I64And,
        (ValType::I64, "or") => I64Or,
        (ValType::I64, "xor") => I64Xor,
        (ValType::I64, "shl") => I64Shl,
        (ValType::I64, "shr_s") => I64ShrS,
        (ValType::I64, "shr_u") => I64ShrU,
        (_, "add") => I32Add,
        (_, "sub") => I32Sub,
        (_, "mul") => I32Mul,
        (_, "div_s") => I32DivS,
        (_, "div_u") => I32DivU,
        (_, "rem_s") => I32RemS,
        (_, "rem_u") => I32RemU,
        (_, "and") => I32And,
        (_, "or") => I32Or,
        (_, "xor") => I32Xor,
        (_, "shl") => I32Shl,
        (_, "shr_s") => I32ShrS,
        (_, "shr_u") => I32ShrU,
        _ => unreachable!(),
    }
}

fn float_op(wty: ValType, name: &str) -> WasmInstr {
    use WasmInstr::*;
    match (wty, name) {
        (ValType::F32, "add") => F32Add,
        (ValType::F32, "sub") => F32Sub,
        (ValType::F32, "mul") => F32Mul,
        (ValType::F32, "div") => F32Div,
        (_, "add") => F64Add,
        (_, "sub") => F64Sub,
        (_, "mul") => F64Mul,
        (_, "div") => F64Div,
        _ => unreachable!(),
    }
}

fn icmp_op(wty: ValType, cc: cot_ssa::IntCC) -> WasmInstr {
    use cot_ssa::IntCC::*;
    use WasmInstr::*;
    match (wty, cc) {
        (ValType::I64, Eq) => I64Eq,
        (ValType::I64, Ne) => I64Ne,
        (ValType::I64, SignedLt) => I64LtS,
        (ValType::I64, SignedLe) => I64LeS,
        (ValType::I64, SignedGt) => I64GtS,
        (ValType::I64, SignedGe) => I64GeS,
        (ValType::I64, UnsignedLt) => I64LtU,
        (ValType::I64, UnsignedLe) => I64LeU,
        (ValType::I64, UnsignedGt) => I64GtU,
        (ValType::I64, UnsignedGe) => I64GeU,
        (_, Eq) => I32Eq,
        (_, Ne) => I32Ne,
        (_, SignedLt) => I32LtS,
        (_, SignedLe) => I32LeS,
        (_, SignedGt) => I32GtS,
        (_, SignedGe) => I32GeS,
        (_, UnsignedLt) => I32LtU,
        (_, UnsignedLe) => I32LeU,
        (_, UnsignedGt) => I32GtU,
        (_, UnsignedGe) => I32GeU,
    }
}

fn fcmp_op(wty: ValType, cc: cot_ssa::FloatCC) -> WasmInstr {
    use cot_ssa::FloatCC::*;
    use WasmInstr::*;
    match (wty, cc) {
        (ValType::F32, Eq) => F32Eq,
        (ValType::F32, Ne) => F32Ne,
        (ValType::F32, Lt) => F32Lt,
        (ValType::F32, Le) => F32Le,
        (ValType::F32, Gt) => F32Gt,
        (ValType::F32, Ge) => F32Ge,
        (_, Eq) => F64Eq,
        (_, Ne) => F64Ne,
        (_, Lt) => F64Lt,
        (_, Le) => F64Le,
        (_, Gt) => F64Gt,
        (_, Ge) => F64Ge,
    }
}

fn load_for(wty: ValType) -> WasmInstr {
    match wty {
        ValType::I32 => WasmInstr::I32Load(MemArg::default()),
        ValType::I64 => WasmInstr::I64Load(MemArg::default()),
        ValType::F32 => WasmInstr::F32Load(MemArg::default()),
        ValType::F64 => WasmInstr::F64Load(MemArg::default()),
    }
}

fn store_for(wty: ValType) -> WasmInstr {
    match wty {
        ValType::I32 => WasmInstr::I32Store(MemArg::default()),
        ValType::I64 => WasmInstr::I64Store(MemArg::default()),
        ValType::F32 => WasmInstr::F32Store(MemArg::default()),
        ValType::F64 => WasmInstr::F64Store(MemArg::default()),
    }
}

fn emit_int_conv(
    from: ValType,
    to: ValType,
    _value: Value,
    _types: &cot_ssa::TypeRegistry,
    _from_ty: TypeIndex,
    out: &mut Vec<WasmInstr>,
) {
    match (from, to) {
        (ValType::I64, ValType::I32) => out.push(WasmInstr::I32WrapI64),
        (ValType::I32, ValType::I64) => out.push(WasmInstr::I64ExtendI32S),
        _ => {}
    }
}

pub fn block_type_for(types: &cot_ssa::TypeRegistry, ty: TypeIndex) -> BlockType {
    if ty == TypeIndex::VOID {
        BlockType::Empty
    } else {
        BlockType::Value(wasm_valtype(types, ty))
    }
}
