//! Shared SSA intermediate representation: the IR every Cot function is
//! lowered into before ARC insertion, optimization, and either the Wasm or
//! native backend takes over (spec.md §3.1).

pub mod dom;
pub mod entities;
pub mod error;
pub mod function;
pub mod op;
pub mod types;
pub mod verify;

pub use entities::{Block, StringLit, Value};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use function::{BlockKind, Function, SourcePos};
pub use op::{BlockCall, FloatCC, IntCC, Op};
pub use types::{
    BasicType, EnumType, FieldType, FunctionType, StructType, TaggedUnionType, Type, TypeIndex,
    TypeRegistry,
};
