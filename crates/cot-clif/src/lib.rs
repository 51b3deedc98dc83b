//! CLIF: the lower-level SSA IR the native backend builds from (spec.md
//! §3.2/§4.5.1), sitting between `cot-opt`'s output and `cot-machinst`'s
//! VCode. Where `cot_ssa::Function` keeps block/value/instruction data in
//! one struct tailored to the ARC/Wasm pipeline, CLIF splits ordering
//! ([`layout::Layout`]) from data ([`dfg::DataFlowGraph`]) and only knows
//! about scalar/SIMD [`types::Type`]s, the way the teacher's own
//! `cranelift-codegen::ir` module is laid out.
//!
//! A function reaches this IR two ways: from `cot-wasm2clif` (translating
//! parsed Wasm bytes) or directly from a lowered-and-optimized
//! `cot_ssa::Function` when the driver targets native code without going
//! through Wasm first.

pub mod dfg;
pub mod entities;
pub mod function;
pub mod inst;
pub mod jumptable;
pub mod layout;
pub mod signature;
pub mod types;

pub use cranelift_entity::EntityRef;
pub use dfg::DataFlowGraph;
pub use entities::{Block, FuncRef, GlobalValue, Inst, JumpTable, SigRef, StackSlot, Value};
pub use function::Function;
pub use inst::{BlockCall, InstData};
pub use jumptable::JumpTableData;
pub use layout::Layout;
pub use signature::{AbiParam, ArgumentExtension, ArgumentPurpose, CallConv, Signature};
pub use types::Type;
