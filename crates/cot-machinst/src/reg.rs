//! Registers (spec.md §3.3/§4.5.2), built directly on `regalloc2`'s own
//! `VReg`/`PReg`/`RegClass` rather than a parallel set of wrapper types —
//! the allocator's output is a mapping from exactly these types, so
//! reusing them avoids a translation layer at every `MachInst::emit`.
//! Modelled on `cranelift-codegen/src/machinst/reg.rs`.

pub use regalloc2::{PReg, PRegSet, RegClass, VReg};

/// A register that hasn't been allocated yet (`Virtual`) or one pinned to
/// hardware (`Physical` — an ABI-fixed argument/return register, or the
/// frame/stack pointer).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reg {
    Virtual(VReg),
    Physical(PReg),
}

impl Reg {
    pub fn class(self) -> RegClass {
        match self {
            Reg::Virtual(v) => v.class(),
            Reg::Physical(p) => p.class(),
        }
    }

    pub fn as_vreg(self) -> Option<VReg> {
        match self {
            Reg::Virtual(v) => Some(v),
            Reg::Physical(_) => None,
        }
    }
}

/// Marks a register as the destination of a def, mirroring Cranelift's
/// `Writable<T>` — a type-level reminder that this particular `Reg`
/// appears in def position, not use position, at the point it's threaded
/// through `MachInst` construction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Writable<T>(T);

impl<T: Copy> Writable<T> {
    pub fn from_reg(reg: T) -> Writable<T> {
        Writable(reg)
    }

    pub fn to_reg(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_round_trips_the_wrapped_register() {
        let v = VReg::new(3, RegClass::Int);
        let w = Writable::from_reg(Reg::Virtual(v));
        assert_eq!(w.to_reg(), Reg::Virtual(v));
    }
}
