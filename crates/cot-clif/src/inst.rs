//! CLIF instructions (spec.md §3.2/§4.5.1).
//!
//! Cranelift itself splits an instruction into an `Opcode` tag plus a
//! separately-interned `InstructionData` payload, so multiple instructions
//! sharing a shape (say, two different binary ops) can share one
//! `InstructionData` variant. Here `Inst` payloads live directly on a single
//! enum, one variant per operation, the same shape `cot_ssa::Op` already
//! uses one level up — CLIF only exists to give the native backend a
//! lower-level IR to select instructions from, not to deduplicate opcode
//! encodings, so there's no separate payoff to the split here.

use crate::entities::{Block, FuncRef, GlobalValue, JumpTable, SigRef, StackSlot, Value};
use crate::types::Type;
use cot_ssa::{FloatCC, IntCC};

/// A branch target together with the block parameters it's invoked with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockCall {
    pub block: Block,
    pub args: Vec<Value>,
}

impl BlockCall {
    pub fn new(block: Block, args: Vec<Value>) -> BlockCall {
        BlockCall { block, args }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstData {
    Iconst(i64),
    F32const(u32),
    F64const(u64),

    Iadd(Value, Value),
    Isub(Value, Value),
    Imul(Value, Value),
    Udiv(Value, Value),
    Sdiv(Value, Value),
    Urem(Value, Value),
    Srem(Value, Value),
    Band(Value, Value),
    Bor(Value, Value),
    Bxor(Value, Value),
    Ishl(Value, Value),
    Ushr(Value, Value),
    Sshr(Value, Value),
    Bnot(Value),
    Ineg(Value),

    Fadd(Value, Value),
    Fsub(Value, Value),
    Fmul(Value, Value),
    Fdiv(Value, Value),
    Fneg(Value),

    Icmp(IntCC, Value, Value),
    Fcmp(FloatCC, Value, Value),

    /// Widen an integer, sign-extending.
    Sextend(Value),
    /// Widen an integer, zero-extending.
    Uextend(Value),
    /// Narrow an integer, truncating high bits.
    Ireduce(Value),
    FcvtToSint(Value),
    FcvtToUint(Value),
    FcvtFromSint(Value),
    FcvtFromUint(Value),
    Fpromote(Value),
    Fdemote(Value),
    /// Reinterpret bits without conversion; source and destination types
    /// must be the same width.
    Bitcast(Value),

    Load { base: Value, offset: i32 },
    Store { base: Value, offset: i32, value: Value },
    StackAddr(StackSlot),
    GlobalValueAddr(GlobalValue),

    Call(FuncRef, Vec<Value>),
    CallIndirect(SigRef, Value, Vec<Value>),

    Jump(BlockCall),
    Brif(Value, BlockCall, BlockCall),
    /// Wasm's `br_table` requires every arm (default included) to accept
    /// the same operand-stack shape, so a single shared `args` list covers
    /// whichever arm the table picks.
    BrTable(Value, JumpTable, Vec<Value>),
    Return(Vec<Value>),
    Trap,

    /// A block parameter; carries no operands of its own, just a type.
    BlockParam,
}

impl InstData {
    /// Visits every [`Value`] this instruction reads, in operand order.
    /// `cot-machinst`'s `OperandVisitor` walks instructions twice this same
    /// way: once collecting uses/defs for the register allocator, once
    /// rewriting vregs to the allocator's assigned physical registers
    /// during emission (spec.md §4.5.2's "double-use visitor").
    pub fn for_each_value(&self, mut f: impl FnMut(Value)) {
        match self {
            InstData::Iconst(_) | InstData::F32const(_) | InstData::F64const(_) => {}
            InstData::Iadd(a, b)
            | InstData::Isub(a, b)
            | InstData::Imul(a, b)
            | InstData::Udiv(a, b)
            | InstData::Sdiv(a, b)
            | InstData::Urem(a, b)
            | InstData::Srem(a, b)
            | InstData::Band(a, b)
            | InstData::Bor(a, b)
            | InstData::Bxor(a, b)
            | InstData::Ishl(a, b)
            | InstData::Ushr(a, b)
            | InstData::Sshr(a, b)
            | InstData::Fadd(a, b)
            | InstData::Fsub(a, b)
            | InstData::Fmul(a, b)
            | InstData::Fdiv(a, b)
            | InstData::Icmp(_, a, b)
            | InstData::Fcmp(_, a, b) => {
                f(*a);
                f(*b);
            }
            InstData::Bnot(a)
            | InstData::Ineg(a)
            | InstData::Fneg(a)
            | InstData::Sextend(a)
            | InstData::Uextend(a)
            | InstData::Ireduce(a)
            | InstData::FcvtToSint(a)
            | InstData::FcvtToUint(a)
            | InstData::FcvtFromSint(a)
            | InstData::FcvtFromUint(a)
            | InstData::Fpromote(a)
            | InstData::Fdemote(a)
            | InstData::Bitcast(a) => f(*a),
            InstData::Load { base, .. } => f(*base),
            InstData::Store { base, value, .. } => {
                f(*base);
                f(*value);
            }
            InstData::StackAddr(_) | InstData::GlobalValueAddr(_) | InstData::Trap | InstData::BlockParam => {}
            InstData::Call(_, args) => args.iter().copied().for_each(f),
            InstData::CallIndirect(_, callee, args) => {
                f(*callee);
                args.iter().copied().for_each(f);
            }
            InstData::Jump(bc) => bc.args.iter().copied().for_each(f),
            InstData::Brif(cond, then, else_) => {
                f(*cond);
                then.args.iter().copied().for_each(&mut f);
                else_.args.iter().copied().for_each(f);
            }
            InstData::BrTable(v, _, args) => {
                f(*v);
                args.iter().copied().for_each(f);
            }
            InstData::Return(vs) => vs.iter().copied().for_each(f),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstData::Jump(_)
                | InstData::Brif(_, _, _)
                | InstData::BrTable(_, _, _)
                | InstData::Return(_)
                | InstData::Trap
        )
    }

    pub fn branch_targets(&self) -> Vec<Block> {
        match self {
            InstData::Jump(bc) => vec![bc.block],
            InstData::Brif(_, then, else_) => vec![then.block, else_.block],
            _ => Vec::new(),
        }
    }
}

/// The result type(s) an `Inst` produces, computed from its operand types
/// rather than stored — CLIF instructions don't carry their own result type
/// the way `cot_ssa::Op` values do, since the type checker has already run
/// one level up and this IR only needs it for register-class selection.
pub fn result_type(data: &InstData, operand_type: impl Fn(Value) -> Type) -> Option<Type> {
    match data {
        InstData::Iconst(_) => Some(Type::I64),
        InstData::F32const(_) => Some(Type::F32),
        InstData::F64const(_) => Some(Type::F64),
        InstData::Icmp(..) | InstData::Fcmp(..) => Some(Type::I8),
        InstData::Load { .. } => None, // caller supplies the loaded type explicitly
        InstData::Jump(_)
        | InstData::Brif(..)
        | InstData::BrTable(..)
        | InstData::Return(_)
        | InstData::Trap
        | InstData::Store { .. } => None,
        InstData::Iadd(a, _)
        | InstData::Isub(a, _)
        | InstData::Imul(a, _)
        | InstData::Udiv(a, _)
        | InstData::Sdiv(a, _)
        | InstData::Urem(a, _)
        | InstData::Srem(a, _)
        | InstData::Band(a, _)
        | InstData::Bor(a, _)
        | InstData::Bxor(a, _)
        | InstData::Ishl(a, _)
        | InstData::Ushr(a, _)
        | InstData::Sshr(a, _)
        | InstData::Fadd(a, _)
        | InstData::Fsub(a, _)
        | InstData::Fmul(a, _)
        | InstData::Fdiv(a, _)
        | InstData::Bnot(a)
        | InstData::Ineg(a)
        | InstData::Fneg(a) => Some(operand_type(*a)),
        InstData::Sextend(_) | InstData::Uextend(_) | InstData::Ireduce(_) | InstData::Bitcast(_) => None,
        InstData::FcvtToSint(_) | InstData::FcvtToUint(_) | InstData::FcvtFromSint(_) | InstData::FcvtFromUint(_) => None,
        InstData::Fpromote(_) | InstData::Fdemote(_) => None,
        InstData::StackAddr(_) | InstData::GlobalValueAddr(_) => Some(Type::I64),
        InstData::Call(..) | InstData::CallIndirect(..) => None,
        InstData::BlockParam => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn binop_visits_both_operands_in_order() {
        let a = Value::new(0);
        let b = Value::new(1);
        let mut seen = Vec::new();
        InstData::Iadd(a, b).for_each_value(|v| seen.push(v));
        assert_eq!(seen, vec![a, b]);
    }

    #[test]
    fn branch_with_block_args_visits_condition_then_both_arg_lists() {
        let cond = Value::new(0);
        let t_arg = Value::new(1);
        let e_arg = Value::new(2);
        let inst = InstData::Brif(
            cond,
            BlockCall::new(Block::new(1), vec![t_arg]),
            BlockCall::new(Block::new(2), vec![e_arg]),
        );
        let mut seen = Vec::new();
        inst.for_each_value(|v| seen.push(v));
        assert_eq!(seen, vec![cond, t_arg, e_arg]);
        assert!(inst.is_terminator());
        assert_eq!(inst.branch_targets(), vec![Block::new(1), Block::new(2)]);
    }
}
