//! SSA operators.
//!
//! Cranelift keeps `Opcode` and `InstructionData` separate and generates the
//! encoding from a DSL (`cranelift-codegen/meta`); Cot's opcode space is
//! smaller and fixed, so `Op` simply carries its own typed payload per
//! variant. The visitor methods below (`for_each_value`/`for_each_value_mut`)
//! play the same role as Cranelift's generated `InstructionData` value
//! visitors: a single traversal used both to count uses and to rewrite
//! operands, so passes never hand-roll per-variant argument lists.
//!
//! This is a representative subset of the ~150 variants named in the
//! specification, organized by the same categories: constants, arithmetic,
//! memory, calls, phi, ARC-specific, and Wasm-lowered variants introduced by
//! `lower_wasm` (see `cot-opt`).

use crate::entities::{Block, StringLit, Value};
use crate::types::TypeIndex;

#[cfg(feature = "enable-serde")]
use serde_derive::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum IntCC {
    Eq,
    Ne,
    SignedLt,
    SignedLe,
    SignedGt,
    SignedGe,
    UnsignedLt,
    UnsignedLe,
    UnsignedGt,
    UnsignedGe,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum FloatCC {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A block-call target: a jump/branch destination plus the blockparam
/// arguments carried along that edge. Liveness and use-counting must see
/// these (spec.md §3.2's historical `EntryLivein` warning about missing
/// branch-arg visibility applies here too).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct BlockCall {
    pub block: Block,
    pub args: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Op {
    // ---- constants ----
    /// Reads function parameter `index`. Materialized once at the top of the
    /// entry block by the lowerer; every other use just refers to that value.
    Param(u32),
    IConst(i64),
    FConst(u64), // bit pattern, f64 doesn't implement Eq
    BoolConst(bool),
    /// Pre-`rewritegeneric`: a raw string literal. Rewritten to
    /// `StringMake(const_addr, const_len)` by the first pass in the
    /// pipeline (spec.md §4.2 step 1).
    ConstString(StringLit),
    /// Reconstructs a STRING value from its two scalar components.
    StringMake { ptr: Value, len: Value },
    /// Reconstructs a slice value from its three scalar components.
    SliceMake { ptr: Value, len: Value, cap: Value },

    // ---- arithmetic ----
    IAdd(Value, Value),
    ISub(Value, Value),
    IMul(Value, Value),
    SDiv(Value, Value),
    UDiv(Value, Value),
    SRem(Value, Value),
    URem(Value, Value),
    And(Value, Value),
    Or(Value, Value),
    Xor(Value, Value),
    Shl(Value, Value),
    ShrS(Value, Value),
    ShrU(Value, Value),
    INeg(Value),
    FAdd(Value, Value),
    FSub(Value, Value),
    FMul(Value, Value),
    FDiv(Value, Value),
    FNeg(Value),
    ICmp(IntCC, Value, Value),
    FCmp(FloatCC, Value, Value),

    // ---- casts ----
    /// `@intCast(smaller, bigger)`: widen an integer. `wider` is the
    /// destination type; Wasm lowering must cross the 32/64 boundary via
    /// `wrap`/`extend` (spec.md §8 boundary behaviour).
    IntCast { value: Value, to: TypeIndex },
    /// `@truncate(T, v)`: narrow an integer to exactly `T`.
    Truncate { value: Value, to: TypeIndex },
    BitCast { value: Value, to: TypeIndex },
    IntToFloat { value: Value, signed: bool, to: TypeIndex },
    FloatToInt { value: Value, signed: bool, to: TypeIndex },

    // ---- memory ----
    /// Rematerializable: address of local slot `slot_index` relative to the
    /// frame, computed as the cumulative sum of preceding local sizes (not
    /// `slot * 8` — STRING locals are 16 bytes, see spec.md §4.4.1).
    LocalAddr { slot_index: u32 },
    GlobalAddr { name: String },
    /// Address of field `offset` bytes into the struct pointed to by `base`.
    FieldAddr { base: Value, offset: u32 },
    /// Resolved at link time to the `FullMetadata` record offset for
    /// `type_name`, or the literal `0` sentinel if the type has no
    /// destructor (spec.md §4.4.1, §4.3).
    MetadataAddr { type_name: String },
    Load { ty: TypeIndex, addr: Value },
    Store { addr: Value, value: Value },

    // ---- calls ----
    Call { callee: String, args: Vec<Value> },
    /// A call synthesized by a pass rather than the lowerer, e.g.
    /// `string_concat` rewriting to `cot_string_concat` (spec.md §4.2 step 4).
    StaticCall { callee: String, args: Vec<Value> },
    CallIndirect { sig: TypeIndex, callee_addr: Value, args: Vec<Value> },

    // ---- control flow (block terminators) ----
    Jump(BlockCall),
    Brif { cond: Value, then: BlockCall, else_: BlockCall },
    Switch { value: Value, cases: Vec<(i64, BlockCall)>, default: BlockCall },
    Return(Vec<Value>),
    Unreachable,

    // ---- phi ----
    Phi(Vec<Value>),

    // ---- slice/string decomposition (post-`decompose`/`rewritedec`) ----
    SlicePtr(Value),
    SliceLen(Value),
    SliceCap(Value),
    StringPtr(Value),
    StringLen(Value),
    /// Identity forwarding introduced by `rewritedec` (e.g.
    /// `slice_ptr(slice_make(p,l,c)) -> copy(p)`); codegen emits nothing.
    Copy(Value),

    // ---- ARC-specific ----
    /// Heap-allocate `size` bytes tagged with `type_name`'s metadata.
    Alloc { type_name: String, size: Value },
    Retain(Value),
    Release(Value),
    /// Direct call to a `<Type>_deinit` destructor (used only by the
    /// ARC-runtime's `release` implementation itself, which otherwise
    /// dispatches indirectly — spec.md §4.3, "no devirtualization").
    DeinitCall { callee: String, this: Value },

    CondSelect { then: Value, else_: Value, cond: Value },

    // ---- Wasm-lowered variants (introduced by `lower_wasm`) ----
    WasmI64Add(Value, Value),
    WasmI32Add(Value, Value),
    WasmI32WrapI64(Value),
    WasmI64ExtendI32 { value: Value, signed: bool },
    WasmSelect { then: Value, else_: Value, cond: Value },
    WasmIConst64(i64),
    WasmIConst32(i32),
}

impl Op {
    /// Visits every `Value` this op reads, in the order codegen should
    /// evaluate them. Branch/phi arguments are included so use-counting
    /// (spec.md §8 invariant 1) and liveness stay correct.
    pub fn for_each_value(&self, mut f: impl FnMut(Value)) {
        use Op::*;
        match self {
            Param(_) | IConst(_) | FConst(_) | BoolConst(_) | ConstString(_)
            | LocalAddr { .. } | GlobalAddr { .. } | MetadataAddr { .. } | Unreachable
            | WasmIConst64(_) | WasmIConst32(_) => {}

            StringMake { ptr, len } => {
                f(*ptr);
                f(*len);
            }
            SliceMake { ptr, len, cap } => {
                f(*ptr);
                f(*len);
                f(*cap);
            }
            IAdd(a, b) | ISub(a, b) | IMul(a, b) | SDiv(a, b) | UDiv(a, b) | SRem(a, b)
            | URem(a, b) | And(a, b) | Or(a, b) | Xor(a, b) | Shl(a, b) | ShrS(a, b)
            | ShrU(a, b) | FAdd(a, b) | FSub(a, b) | FMul(a, b) | FDiv(a, b)
            | WasmI64Add(a, b) | WasmI32Add(a, b) => {
                f(*a);
                f(*b);
            }
            ICmp(_, a, b) | FCmp(_, a, b) => {
                f(*a);
                f(*b);
            }
            INeg(v) | FNeg(v) | IntCast { value: v, .. } | Truncate { value: v, .. }
            | BitCast { value: v, .. } | IntToFloat { value: v, .. }
            | FloatToInt { value: v, .. } | SlicePtr(v) | SliceLen(v) | SliceCap(v)
            | StringPtr(v) | StringLen(v) | Copy(v) | Retain(v) | Release(v)
            | WasmI32WrapI64(v) | WasmI64ExtendI32 { value: v, .. } => f(*v),

            FieldAddr { base, .. } => f(*base),
            Load { addr, .. } => f(*addr),
            Store { addr, value } => {
                f(*addr);
                f(*value);
            }
            Call { args, .. } | StaticCall { args, .. } | Return(args) | Phi(args) => {
                for a in args {
                    f(*a);
                }
            }
            CallIndirect { callee_addr, args, .. } => {
                f(*callee_addr);
                for a in args {
                    f(*a);
                }
            }
            Jump(bc) => visit_block_call(bc, &mut f),
            Brif { cond, then, else_ } => {
                f(*cond);
                visit_block_call(then, &mut f);
                visit_block_call(else_, &mut f);
            }
            Switch { value, cases, default } => {
                f(*value);
                for (_, bc) in cases {
                    visit_block_call(bc, &mut f);
                }
                visit_block_call(default, &mut f);
            }
            Alloc { size, .. } => f(*size),
            DeinitCall { this, .. } => f(*this),
            CondSelect { then, else_, cond } | WasmSelect { then, else_, cond } => {
                f(*then);
                f(*else_);
                f(*cond);
            }
        }
    }

    pub fn collect_values(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.for_each_value(|v| out.push(v));
        out
    }

    /// Ops that are re-emitted at every use site rather than stored to a
    /// local (spec.md §4.4.1): constants and address computations.
    pub fn is_rematerializable(&self) -> bool {
        matches!(
            self,
            Op::IConst(_)
                | Op::FConst(_)
                | Op::BoolConst(_)
                | Op::LocalAddr { .. }
                | Op::GlobalAddr { .. }
                | Op::MetadataAddr { .. }
                | Op::WasmIConst64(_)
                | Op::WasmIConst32(_)
        )
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Jump(_) | Op::Brif { .. } | Op::Switch { .. } | Op::Return(_) | Op::Unreachable
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Op::Phi(_))
    }
}

fn visit_block_call(bc: &BlockCall, f: &mut impl FnMut(Value)) {
    for a in &bc.args {
        f(*a);
    }
}
