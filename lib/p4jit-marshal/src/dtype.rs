//! The numeric element types a host array can carry, and how they're
//! checked against a parameter's pointed-to C type. Grounded on
//! `original_source`'s `smart_args.py` dtype/C-type reconciliation,
//! generalized from its hardcoded 32-bit view to the full 8/16/32/64-
//! bit set the wrapper synthesizer already supports.

use p4jit_proto::CType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Dtype {
    pub fn byte_width(&self) -> usize {
        match self {
            Dtype::I8 | Dtype::U8 => 1,
            Dtype::I16 | Dtype::U16 => 2,
            Dtype::I32 | Dtype::U32 | Dtype::F32 => 4,
            Dtype::I64 | Dtype::U64 | Dtype::F64 => 8,
        }
    }

    fn exact_ctype(&self) -> CType {
        match self {
            Dtype::I8 => CType::I8,
            Dtype::U8 => CType::U8,
            Dtype::I16 => CType::I16,
            Dtype::U16 => CType::U16,
            Dtype::I32 => CType::I32,
            Dtype::U32 => CType::U32,
            Dtype::I64 => CType::I64,
            Dtype::U64 => CType::U64,
            Dtype::F32 => CType::F32,
            Dtype::F64 => CType::F64,
        }
    }

    /// Whether an array of this element type may back a pointer
    /// parameter whose pointee is `pointee`: exact name match, a
    /// `void*` (accepts anything), or identical byte width (spec.md
    /// §4.8's "by name or by element size" rule).
    pub fn matches_pointee(&self, pointee: &CType) -> bool {
        if matches!(pointee, CType::Void) {
            return true;
        }
        if &self.exact_ctype() == pointee {
            return true;
        }
        self.byte_width() == pointee.byte_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_pointee_accepts_any_dtype() {
        assert!(Dtype::F32.matches_pointee(&CType::Void));
        assert!(Dtype::I8.matches_pointee(&CType::Void));
    }

    #[test]
    fn exact_name_match_accepted() {
        assert!(Dtype::I32.matches_pointee(&CType::I32));
    }

    #[test]
    fn same_width_but_different_signedness_accepted_by_size() {
        assert!(Dtype::I32.matches_pointee(&CType::U32));
    }

    #[test]
    fn mismatched_width_rejected() {
        assert!(!Dtype::I16.matches_pointee(&CType::I32));
    }
}
