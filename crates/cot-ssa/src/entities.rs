//! Entity reference types for the SSA IR: densely numbered indices into the
//! parallel arrays owned by [`crate::function::Function`], in the same
//! spirit as `cranelift_entity`'s `Block`/`Inst`/`Value` handles.

use cranelift_entity::entity_impl;

#[cfg(feature = "enable-serde")]
use serde_derive::{Deserialize, Serialize};

/// A basic block. Stable for the lifetime of the owning function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An SSA value. Stable for the lifetime of the owning function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Value(u32);
entity_impl!(Value, "v");

/// Index into a function's literal pool (interned string constants).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StringLit(u32);
entity_impl!(StringLit, "str");
