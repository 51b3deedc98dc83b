//! `CompileError`: the driver's own error type, wrapping every
//! crate-local failure mode in one `{kind, message, ...}` shape (spec.md
//! §7) so a caller never has to match on five different error enums to
//! print one diagnostic line.

use cot_ssa::{CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
#[error("{}", render(.kind, .message, .pass_name))]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub block_id: Option<cot_ssa::Block>,
    pub value_id: Option<cot_ssa::Value>,
    pub pass_name: Option<&'static str>,
    pub source_pos: Option<cot_ssa::SourcePos>,
}

fn render(kind: &ErrorKind, message: &str, pass_name: &Option<&'static str>) -> String {
    match pass_name {
        Some(pass) => format!("{kind:?} error in pass `{pass}`: {message}"),
        None => format!("{kind:?} error: {message}"),
    }
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> CompileError {
        CompileError { kind, message: message.into(), block_id: None, value_id: None, pass_name: None, source_pos: None }
    }

    pub fn user(message: impl Into<String>) -> CompileError {
        // `ErrorKind` has no dedicated "user" variant (spec.md's taxonomy
        // names one, §7); module-resolution and CLI-level failures that
        // aren't an internal pass bug are reported as `Resource` errors,
        // the closest existing kind for "the environment/input is wrong,
        // not the compiler."
        CompileError::new(ErrorKind::Resource, message)
    }
}

impl From<CoreError> for CompileError {
    fn from(e: CoreError) -> CompileError {
        CompileError {
            kind: e.kind,
            message: e.message,
            block_id: e.block_id,
            value_id: e.value_id,
            pass_name: Some(e.pass_name),
            source_pos: e.source_pos,
        }
    }
}

impl From<cot_wasm2clif::Error> for CompileError {
    fn from(e: cot_wasm2clif::Error) -> CompileError {
        CompileError::new(ErrorKind::Codegen, e.to_string())
    }
}

impl From<crate::isel::IselError> for CompileError {
    fn from(e: crate::isel::IselError) -> CompileError {
        CompileError::new(ErrorKind::Codegen, e.0)
    }
}

impl From<regalloc2::RegAllocError> for CompileError {
    fn from(e: regalloc2::RegAllocError) -> CompileError {
        CompileError::new(ErrorKind::Codegen, format!("register allocation failed: {e:?}"))
    }
}
