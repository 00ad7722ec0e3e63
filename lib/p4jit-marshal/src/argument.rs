//! Host-side argument representation: the marshaller is generic over
//! argument *category* (scalar vs. array) but not over element type,
//! so pointer arguments are a closed enum over the dtypes the wrapper
//! synthesizer understands, each carrying a mutable contiguous view
//! so `sync_back` can write straight into the caller's array.

use ndarray::{ArrayViewMut, IxDyn};

use crate::dtype::Dtype;

/// A by-value argument, already typed to one of the widths the
/// wrapper's slot-unpacking supports (spec.md §4.8).
#[derive(Debug, Clone, Copy)]
pub enum ScalarArg {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

/// A host numeric array backing a pointer parameter, type-erased over
/// its element dtype. Holds a mutable view so a modified device
/// buffer can be copied straight back into the caller's storage.
pub enum ArrayArg<'a> {
    I8(ArrayViewMut<'a, i8, IxDyn>),
    U8(ArrayViewMut<'a, u8, IxDyn>),
    I16(ArrayViewMut<'a, i16, IxDyn>),
    U16(ArrayViewMut<'a, u16, IxDyn>),
    I32(ArrayViewMut<'a, i32, IxDyn>),
    U32(ArrayViewMut<'a, u32, IxDyn>),
    I64(ArrayViewMut<'a, i64, IxDyn>),
    U64(ArrayViewMut<'a, u64, IxDyn>),
    F32(ArrayViewMut<'a, f32, IxDyn>),
    F64(ArrayViewMut<'a, f64, IxDyn>),
}

impl<'a> ArrayArg<'a> {
    pub fn dtype(&self) -> Dtype {
        match self {
            ArrayArg::I8(_) => Dtype::I8,
            ArrayArg::U8(_) => Dtype::U8,
            ArrayArg::I16(_) => Dtype::I16,
            ArrayArg::U16(_) => Dtype::U16,
            ArrayArg::I32(_) => Dtype::I32,
            ArrayArg::U32(_) => Dtype::U32,
            ArrayArg::I64(_) => Dtype::I64,
            ArrayArg::U64(_) => Dtype::U64,
            ArrayArg::F32(_) => Dtype::F32,
            ArrayArg::F64(_) => Dtype::F64,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype().byte_width()
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayArg::I8(a) => a.len(),
            ArrayArg::U8(a) => a.len(),
            ArrayArg::I16(a) => a.len(),
            ArrayArg::U16(a) => a.len(),
            ArrayArg::I32(a) => a.len(),
            ArrayArg::U32(a) => a.len(),
            ArrayArg::I64(a) => a.len(),
            ArrayArg::U64(a) => a.len(),
            ArrayArg::F32(a) => a.len(),
            ArrayArg::F64(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The array's contiguous bytes in device little-endian wire
    /// order, or `None` if the view is not contiguous (the caller must
    /// hand the marshaller a standard-layout array, per spec.md
    /// §4.8's "flatten to contiguous storage").
    pub fn to_le_bytes(&self) -> Option<Vec<u8>> {
        macro_rules! flatten {
            ($arr:expr) => {{
                let slice = $arr.as_slice()?;
                let mut out = Vec::new();
                for v in slice {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Some(out)
            }};
        }
        match self {
            ArrayArg::I8(a) => {
                let slice = a.as_slice()?;
                Some(slice.iter().map(|v| *v as u8).collect())
            }
            ArrayArg::U8(a) => Some(a.as_slice()?.to_vec()),
            ArrayArg::I16(a) => flatten!(a),
            ArrayArg::U16(a) => flatten!(a),
            ArrayArg::I32(a) => flatten!(a),
            ArrayArg::U32(a) => flatten!(a),
            ArrayArg::I64(a) => flatten!(a),
            ArrayArg::U64(a) => flatten!(a),
            ArrayArg::F32(a) => flatten!(a),
            ArrayArg::F64(a) => flatten!(a),
        }
    }

    /// Copies `bytes` (device byte order, little-endian) back into the
    /// array's own storage, element by element. Used by `sync_back`.
    pub fn copy_from_le_bytes(&mut self, bytes: &[u8]) {
        macro_rules! unflatten {
            ($arr:expr, $ty:ty) => {{
                if let Some(slice) = $arr.as_slice_mut() {
                    let width = std::mem::size_of::<$ty>();
                    for (i, chunk) in bytes.chunks_exact(width).enumerate() {
                        if i >= slice.len() {
                            break;
                        }
                        let mut buf = [0u8; std::mem::size_of::<$ty>()];
                        buf.copy_from_slice(chunk);
                        slice[i] = <$ty>::from_le_bytes(buf);
                    }
                }
            }};
        }
        match self {
            ArrayArg::I8(a) => {
                if let Some(slice) = a.as_slice_mut() {
                    for (i, b) in bytes.iter().enumerate() {
                        if i >= slice.len() {
                            break;
                        }
                        slice[i] = *b as i8;
                    }
                }
            }
            ArrayArg::U8(a) => {
                if let Some(slice) = a.as_slice_mut() {
                    let n = slice.len().min(bytes.len());
                    slice[..n].copy_from_slice(&bytes[..n]);
                }
            }
            ArrayArg::I16(a) => unflatten!(a, i16),
            ArrayArg::U16(a) => unflatten!(a, u16),
            ArrayArg::I32(a) => unflatten!(a, i32),
            ArrayArg::U32(a) => unflatten!(a, u32),
            ArrayArg::I64(a) => unflatten!(a, i64),
            ArrayArg::U64(a) => unflatten!(a, u64),
            ArrayArg::F32(a) => unflatten!(a, f32),
            ArrayArg::F64(a) => unflatten!(a, f64),
        }
    }
}

/// One marshalled argument: either a plain value or a host array
/// backing a pointer parameter, with an optional capability override
/// (the array's `.p4_caps` attribute in `original_source`).
pub enum Argument<'a> {
    Scalar(ScalarArg),
    Array { view: ArrayArg<'a>, caps: Option<u32> },
}

/// A pointer argument's device-side shadow, kept only long enough to
/// copy the device's (possibly modified) bytes back after the call.
pub struct TrackedArray<'a> {
    pub addr: u32,
    pub size: u32,
    pub view: ArrayArg<'a>,
}

/// A call's typed return value, reinterpreted from the raw tail
/// slot(s) according to the signature's return type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReturnValue {
    Void,
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Pointer(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn flattens_and_restores_i32_array_round_trip() {
        let mut backing = Array1::from(vec![1i32, 2, 3, 4]).into_dyn();
        let bytes = {
            let arg = ArrayArg::I32(backing.view_mut());
            arg.to_le_bytes().unwrap()
        };
        assert_eq!(bytes.len(), 16);

        let modified: Vec<u8> = vec![9i32, 8, 7, 6]
            .into_iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut arg = ArrayArg::I32(backing.view_mut());
        arg.copy_from_le_bytes(&modified);
        assert_eq!(backing.iter().copied().collect::<Vec<_>>(), vec![9, 8, 7, 6]);
    }

    #[test]
    fn u8_array_round_trips_without_byte_swapping() {
        let mut backing = Array1::from(vec![10u8, 20, 30]).into_dyn();
        let bytes = ArrayArg::U8(backing.view_mut()).to_le_bytes().unwrap();
        assert_eq!(bytes, vec![10, 20, 30]);
    }
}
