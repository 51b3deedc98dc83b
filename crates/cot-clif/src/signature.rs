//! Call-convention and ABI parameter metadata (spec.md §3.2), modelled on
//! `cranelift-codegen/src/ir/extfunc.rs`.

use crate::types::Type;

/// Calling convention a [`Signature`] is lowered under. Cot only ever
/// targets its own native ABI, but the type exists so `cot-machinst`'s ABI
/// code has somewhere to branch on platform (aarch64 vs. x64) without
/// threading a separate enum through every call site.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallConv {
    /// The System V AMD64 ABI, used on x86-64 targets.
    SystemV,
    /// AAPCS64, used on aarch64 targets.
    AppleAarch64,
}

impl CallConv {
    pub fn for_target(triple: &target_lexicon::Triple) -> CallConv {
        match triple.architecture {
            target_lexicon::Architecture::Aarch64(_) => CallConv::AppleAarch64,
            _ => CallConv::SystemV,
        }
    }
}

/// Why a parameter or return value exists, beyond carrying a source-level
/// argument. Most are `Normal`; the rest let the ABI layer recognize the
/// slots it synthesizes itself (struct-return pointers, the frame's vararg
/// save area) without the caller having to know about them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgumentPurpose {
    Normal,
    /// A hidden pointer to the caller-allocated space a composite return
    /// value gets written into.
    StructReturn,
    /// The callee's own incoming struct-return pointer, reappearing as a
    /// synthetic return so epilogue code can hand it back in the ABI's
    /// designated return register.
    StructReturnOut,
}

/// Whether a sub-word integer argument must be sign- or zero-extended to
/// fill its register/stack slot before the call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgumentExtension {
    None,
    Sext,
    Uext,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AbiParam {
    pub value_type: Type,
    pub purpose: ArgumentPurpose,
    pub extension: ArgumentExtension,
}

impl AbiParam {
    pub fn new(value_type: Type) -> AbiParam {
        AbiParam { value_type, purpose: ArgumentPurpose::Normal, extension: ArgumentExtension::None }
    }

    pub fn special(value_type: Type, purpose: ArgumentPurpose) -> AbiParam {
        AbiParam { value_type, purpose, extension: ArgumentExtension::None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<AbiParam>,
    pub returns: Vec<AbiParam>,
    pub call_conv: CallConv,
}

impl Signature {
    pub fn new(call_conv: CallConv) -> Signature {
        Signature { params: Vec::new(), returns: Vec::new(), call_conv }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_params_default_to_normal_purpose_and_no_extension() {
        let p = AbiParam::new(Type::I32);
        assert_eq!(p.purpose, ArgumentPurpose::Normal);
        assert_eq!(p.extension, ArgumentExtension::None);
    }

    #[test]
    fn signature_accumulates_params_and_returns() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(Type::I64));
        sig.returns.push(AbiParam::new(Type::I64));
        assert_eq!(sig.params.len(), 1);
        assert_eq!(sig.returns.len(), 1);
    }
}
