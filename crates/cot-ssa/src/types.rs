//! Type representation shared by the SSA IR.
//!
//! Basic scalar types occupy fixed low indices in every [`TypeRegistry`] so
//! code can compare against them without a lookup, mirroring the way
//! Cranelift reserves its low `ir::Type` values for scalars.

use cranelift_entity::{entity_impl, PrimaryMap};

#[cfg(feature = "enable-serde")]
use serde_derive::{Deserialize, Serialize};

/// Dense index into a function's [`TypeRegistry`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct TypeIndex(u32);
entity_impl!(TypeIndex, "type");

macro_rules! basic_type_slots {
    ($($name:ident = $val:expr),* $(,)?) => {
        impl TypeIndex {
            $(pub const $name: TypeIndex = TypeIndex($val);)*
        }
    };
}

basic_type_slots! {
    I8 = 0, I16 = 1, I32 = 2, I64 = 3,
    U8 = 4, U16 = 5, U32 = 6, U64 = 7,
    F32 = 8, F64 = 9, BOOL = 10, STRING = 11, VOID = 12,
}

/// Number of reserved scalar slots at the head of every registry.
pub const NUM_BASIC_TYPES: u32 = 13;

/// Scalar kinds. `STRING` is internally `slice<u8>` (ptr + len, 16 bytes) —
/// this distinction drives the `rewritedec` pass (see `cot-opt`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum BasicType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    String,
    Void,
}

impl BasicType {
    pub fn size_of(self) -> u32 {
        match self {
            BasicType::I8 | BasicType::U8 | BasicType::Bool => 1,
            BasicType::I16 | BasicType::U16 => 2,
            BasicType::I32 | BasicType::U32 | BasicType::F32 => 4,
            BasicType::I64 | BasicType::U64 | BasicType::F64 => 8,
            // slice<u8>: ptr (8) + len (8)
            BasicType::String => 16,
            BasicType::Void => 0,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, BasicType::I8 | BasicType::I16 | BasicType::I32 | BasicType::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, BasicType::F32 | BasicType::F64)
    }

    fn from_slot(idx: u32) -> Option<BasicType> {
        Some(match idx {
            0 => BasicType::I8,
            1 => BasicType::I16,
            2 => BasicType::I32,
            3 => BasicType::I64,
            4 => BasicType::U8,
            5 => BasicType::U16,
            6 => BasicType::U32,
            7 => BasicType::U64,
            8 => BasicType::F32,
            9 => BasicType::F64,
            10 => BasicType::Bool,
            11 => BasicType::String,
            12 => BasicType::Void,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FieldType {
    pub name: String,
    pub ty: TypeIndex,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StructType {
    pub name: String,
    pub fields: Vec<FieldType>,
    pub size: u32,
    pub align: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
    /// Backing integer type (`I32` unless the source annotated a width).
    pub repr: TypeIndex,
}

/// A `tag + max(payload)` tagged union, e.g. `Result { Ok: int, Err }`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct TaggedUnionType {
    pub name: String,
    pub variants: Vec<(String, Option<TypeIndex>)>,
    pub tag_size: u32,
    pub max_payload_size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FunctionType {
    pub params: Vec<TypeIndex>,
    pub ret: TypeIndex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Type {
    Basic(BasicType),
    Pointer { pointee: TypeIndex },
    Slice { elem: TypeIndex },
    Array { elem: TypeIndex, len: u64 },
    Struct(StructType),
    Enum(EnumType),
    TaggedUnion(TaggedUnionType),
    Optional { inner: TypeIndex },
    ErrorUnion { ok: TypeIndex, err: TypeIndex },
    Function(FunctionType),
}

/// Owns every type reachable from a [`crate::function::Function`]. Basic
/// scalars are pre-registered at fixed indices (see `basic_type_slots!`);
/// everything else is interned on first use so structurally identical
/// composite types still get distinct indices per declaration site (Cot
/// types are nominal, unlike Cranelift's structural `ir::Type`).
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct TypeRegistry {
    types: PrimaryMap<TypeIndex, Type>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut types = PrimaryMap::new();
        for slot in 0..NUM_BASIC_TYPES {
            let basic = BasicType::from_slot(slot).expect("basic type slot");
            types.push(Type::Basic(basic));
        }
        TypeRegistry { types }
    }

    pub fn lookup(&self, idx: TypeIndex) -> &Type {
        &self.types[idx]
    }

    /// Register a new composite type, returning its fresh index.
    pub fn intern(&mut self, ty: Type) -> TypeIndex {
        debug_assert!(!matches!(ty, Type::Basic(_)), "basic types are pre-registered");
        self.types.push(ty)
    }

    pub fn size_of(&self, idx: TypeIndex) -> u32 {
        match self.lookup(idx) {
            Type::Basic(b) => b.size_of(),
            Type::Pointer { .. } | Type::Function(_) => 8,
            Type::Slice { .. } => 16, // ptr + len
            Type::Array { elem, len } => self.size_of(*elem) * (*len as u32),
            Type::Struct(s) => s.size,
            Type::Enum(e) => self.size_of(e.repr),
            Type::TaggedUnion(u) => align_up(u.tag_size + u.max_payload_size, 8),
            Type::Optional { inner } => self.size_of(*inner) + 1,
            Type::ErrorUnion { ok, err } => 4 + self.size_of(*ok).max(self.size_of(*err)),
        }
    }

    pub fn align_of(&self, idx: TypeIndex) -> u32 {
        match self.lookup(idx) {
            Type::Basic(b) => b.size_of().max(1).min(8),
            Type::Struct(s) => s.align,
            Type::Slice { .. } | Type::Pointer { .. } | Type::Function(_) => 8,
            _ => self.size_of(idx).min(8).max(1),
        }
    }

    /// Heap-allocated, reference-counted types. `new T{..}` only applies to
    /// these; the destructor table (see `cot-arc`) only has entries for
    /// structs with a matching `<Type>_deinit` function.
    pub fn is_arc_managed(&self, idx: TypeIndex) -> bool {
        matches!(self.lookup(idx), Type::Struct(_))
    }

    pub fn is_string(&self, idx: TypeIndex) -> bool {
        matches!(self.lookup(idx), Type::Basic(BasicType::String))
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_slots_are_stable() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.lookup(TypeIndex::I64), &Type::Basic(BasicType::I64));
        assert_eq!(reg.lookup(TypeIndex::STRING), &Type::Basic(BasicType::String));
        assert_eq!(reg.size_of(TypeIndex::STRING), 16);
        assert_eq!(reg.size_of(TypeIndex::VOID), 0);
    }

    #[test]
    fn struct_interning_computes_size() {
        let mut reg = TypeRegistry::new();
        let idx = reg.intern(Type::Struct(StructType {
            name: "P".into(),
            fields: vec![
                FieldType { name: "x".into(), ty: TypeIndex::I64, offset: 0 },
                FieldType { name: "y".into(), ty: TypeIndex::I64, offset: 8 },
            ],
            size: 16,
            align: 8,
        }));
        assert_eq!(reg.size_of(idx), 16);
        assert!(reg.is_arc_managed(idx));
    }
}
