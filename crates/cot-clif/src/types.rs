//! CLIF's `Type`: an opaque 16-bit tag (spec.md §3.2), unlike `cot_ssa`'s
//! `TypeIndex` (which indexes into a per-function registry of composite
//! types). CLIF only ever sees the scalar/SIMD lanes left after `decompose`
//! has split every compound value into its components, so a flat tag space
//! is enough — no registry needed here.
//!
//! Modelled on `cranelift-codegen/src/ir/types.rs`.

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Type(u16);

macro_rules! scalar_types {
    ($($name:ident = $val:expr => $bytes:expr;)*) => {
        impl Type {
            $(pub const $name: Type = Type($val);)*

            pub fn bytes(self) -> u32 {
                match self {
                    $(Type::$name => $bytes,)*
                    _ => 0,
                }
            }
        }
    };
}

scalar_types! {
    I8 = 0 => 1;
    I16 = 1 => 2;
    I32 = 2 => 4;
    I64 = 3 => 8;
    I128 = 4 => 16;
    F16 = 5 => 2;
    F32 = 6 => 4;
    F64 = 7 => 8;
    F128 = 8 => 16;
    I32X4 = 9 => 16;
    I64X2 = 10 => 16;
    F32X4 = 11 => 16;
    F64X2 = 12 => 16;
    INVALID = 0xffff => 0;
}

impl Type {
    pub fn is_int(self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::I128)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::F16 | Type::F32 | Type::F64 | Type::F128)
    }

    pub fn is_vector(self) -> bool {
        matches!(self, Type::I32X4 | Type::I64X2 | Type::F32X4 | Type::F64X2)
    }

    /// Lane count times lane width in bytes for vectors; 1 lane otherwise.
    pub fn lane_count(self) -> u32 {
        match self {
            Type::I32X4 | Type::F32X4 => 4,
            Type::I64X2 | Type::F64X2 => 2,
            _ => 1,
        }
    }
}

impl Default for Type {
    fn default() -> Self {
        Type::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_widths_match_scalar_sizes() {
        assert_eq!(Type::I8.bytes(), 1);
        assert_eq!(Type::I64.bytes(), 8);
        assert_eq!(Type::F64.bytes(), 8);
    }

    #[test]
    fn vectors_report_lane_counts() {
        assert_eq!(Type::I32X4.lane_count(), 4);
        assert_eq!(Type::F64X2.lane_count(), 2);
        assert!(Type::I32X4.is_vector());
        assert!(!Type::I32.is_vector());
    }
}
