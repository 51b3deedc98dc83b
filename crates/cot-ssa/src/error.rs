//! Error taxonomy shared across the pipeline (spec.md §7): kinds, not
//! individual messages, carry a context struct so the driver can render
//! `<path>:<line>:<col>: error <code>: <msg>` without every pass
//! reimplementing formatting.

use thiserror::Error;

use crate::entities::{Block, Value};
use crate::function::SourcePos;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid block/value id, use-count mismatch, edge-invariant
    /// violation. Always fatal; indicates a pass bug.
    Structural,
    /// Mismatched types in IR; must not occur post type-checker.
    Type,
    /// Allocation failure or similar external resource failure.
    Resource,
    /// Invalid instruction, register allocation failure, unsupported op.
    Codegen,
}

#[derive(Debug, Error)]
#[error("{kind:?} error in pass `{pass_name}`: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub block_id: Option<Block>,
    pub value_id: Option<Value>,
    pub pass_name: &'static str,
    pub source_pos: Option<SourcePos>,
}

impl CoreError {
    pub fn structural(pass_name: &'static str, message: impl Into<String>) -> Self {
        CoreError { kind: ErrorKind::Structural, message: message.into(), block_id: None, value_id: None, pass_name, source_pos: None }
    }

    pub fn with_value(mut self, v: Value) -> Self {
        self.value_id = Some(v);
        self
    }

    pub fn with_block(mut self, b: Block) -> Self {
        self.block_id = Some(b);
        self
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
