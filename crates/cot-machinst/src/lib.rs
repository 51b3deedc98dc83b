//! VCode, the register-allocation plumbing around `regalloc2`, and the
//! AArch64/x86-64 instruction backends (spec.md §3.3/§4.5.2-§4.5.5). Sits
//! between `cot-clif`'s IR and `cot-objgen`'s object-file emission: a
//! function is selected into one ISA's [`vcode::MachInst`] stream, run
//! through `regalloc2`, emitted into a [`buffer::MachBuffer`], and handed
//! to `cot-objgen` as finished bytes plus relocations.

pub mod abi;
pub mod buffer;
pub mod isa;
pub mod operand;
pub mod reg;
pub mod vcode;

pub use abi::FrameLayout;
pub use buffer::{MachBuffer, MachLabel, MachReloc, RelocKind};
pub use operand::OperandVisitor;
pub use reg::{PReg, Reg, RegClass, VReg, Writable};
pub use vcode::{apply_allocations, MachInst, VCode};
