pub mod aarch64;
pub mod x64;

use cot_clif::CallConv;
use target_lexicon::{Architecture, Triple};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Isa {
    Aarch64,
    X64,
}

pub fn isa_for_target(triple: &Triple) -> Isa {
    match triple.architecture {
        Architecture::Aarch64(_) => Isa::Aarch64,
        _ => Isa::X64,
    }
}

pub fn call_conv_for_target(triple: &Triple) -> CallConv {
    CallConv::for_target(triple)
}
