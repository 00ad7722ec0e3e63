//! Host scalar/array to slot-buffer marshalling (spec.md §4.8).
//!
//! A [`Marshaller`] is created fresh for one call, packs the caller's
//! arguments into the device's slot buffer (allocating a device
//! backing store for every pointer argument along the way), and is
//! responsible for releasing every one of those allocations exactly
//! once — whether the call that follows succeeds or not. Callers
//! drive it through the same four-step sequence every time: `pack`,
//! then (after the caller has written the slots and executed) either
//! `sync_back`/`read_return` on success, then always `cleanup`.

mod argument;
mod dtype;
mod error;

pub use argument::{ArrayArg, Argument, ReturnValue, ScalarArg, TrackedArray};
pub use dtype::Dtype;
pub use error::{MarshalError, Result};

use log::warn;
use p4jit_proto::{caps, CType, ParamCategory, Signature};
use p4jit_session::DeviceSession;

/// Alignment used for every device allocation the marshaller creates
/// to back a pointer argument (spec.md §4.8: "alignment 16").
const ARRAY_ALLOCATION_ALIGNMENT: u32 = 16;

/// Packs one call's arguments, tracks what it allocated and what it
/// needs to copy back, and guarantees every allocation it made is
/// released by `cleanup` regardless of how the call in between went.
pub struct Marshaller<'a> {
    allocations: Vec<u32>,
    tracked: Vec<TrackedArray<'a>>,
}

impl<'a> Marshaller<'a> {
    pub fn new() -> Self {
        Self {
            allocations: Vec::new(),
            tracked: Vec::new(),
        }
    }

    /// Packs `args` against `signature` into a slot buffer of
    /// `slot_count` 32-bit words, allocating device storage for every
    /// pointer argument on `session` as it goes.
    ///
    /// On any failure partway through, every allocation already made
    /// in this call is released before the error is returned (spec.md
    /// §4.8, §7: "Marshaller errors during `pack` still trigger
    /// `cleanup`").
    pub fn pack(
        &mut self,
        session: &mut DeviceSession,
        signature: &Signature,
        slot_count: u32,
        args: Vec<Argument<'a>>,
    ) -> Result<Vec<u8>> {
        check_arity(signature, &args)?;

        match self.pack_inner(session, signature, args) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.cleanup(session);
                Err(e)
            }
        }
        .map(|bytes| {
            let mut padded = bytes;
            padded.resize((slot_count * 4) as usize, 0);
            padded
        })
    }

    fn pack_inner(
        &mut self,
        session: &mut DeviceSession,
        signature: &Signature,
        args: Vec<Argument<'a>>,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (index, (param, arg)) in signature.parameters.iter().zip(args).enumerate() {
            match (param.category, arg) {
                (ParamCategory::Pointer, Argument::Array { view, caps: override_caps }) => {
                    let pointee = pointee_of(&param.ty);
                    if !view.dtype().matches_pointee(&pointee) {
                        return Err(MarshalError::TypeMismatch {
                            index,
                            name: param.name.clone(),
                            expected_ctype: format!("{pointee:?}"),
                            got_width: view.dtype().byte_width(),
                            expected_width: pointee.byte_width(),
                        });
                    }
                    let bytes = view.to_le_bytes().ok_or_else(|| MarshalError::NotAnArray {
                        index,
                        name: param.name.clone(),
                        expected_ctype: format!("{pointee:?}"),
                    })?;
                    let size = view.byte_len();
                    let caps = override_caps.unwrap_or(caps::DEFAULT_ARRAY);
                    let addr = session.allocate(size as u32, caps, ARRAY_ALLOCATION_ALIGNMENT)?;
                    self.allocations.push(addr);
                    session.write_memory(addr, &bytes, true)?;
                    self.tracked.push(TrackedArray {
                        addr,
                        size: size as u32,
                        view,
                    });
                    out.extend_from_slice(&addr.to_le_bytes());
                }
                (ParamCategory::Pointer, Argument::Scalar(_)) => {
                    return Err(MarshalError::NotAnArray {
                        index,
                        name: param.name.clone(),
                        expected_ctype: format!("{:?}", pointee_of(&param.ty)),
                    });
                }
                (ParamCategory::Value, Argument::Scalar(scalar)) => {
                    out.extend_from_slice(&pack_scalar(scalar));
                }
                (ParamCategory::Value, Argument::Array { .. }) => {
                    return Err(MarshalError::NotAScalar {
                        index,
                        name: param.name.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Copies every tracked array's (possibly device-modified) bytes
    /// back into the host array it came from. Per-array failures are
    /// logged and skipped rather than propagated (spec.md §4.8: "do
    /// not fail the call").
    pub fn sync_back(&mut self, session: &mut DeviceSession) {
        for tracked in &mut self.tracked {
            match session.read_memory(tracked.addr, tracked.size, true) {
                Ok(bytes) => tracked.view.copy_from_le_bytes(&bytes),
                Err(e) => warn!(
                    "sync-back of {} bytes at {:#010x} failed, leaving host array unchanged: {e}",
                    tracked.size, tracked.addr
                ),
            }
        }
    }

    /// Reads the return slot(s) at the metadata's recorded address and
    /// reinterprets them per `return_type`.
    pub fn read_return(
        &self,
        session: &mut DeviceSession,
        return_type: &CType,
        return_addr: u32,
    ) -> Result<ReturnValue> {
        if matches!(return_type, CType::Void) {
            return Ok(ReturnValue::Void);
        }
        let width = return_type.byte_width().max(4);
        let bytes = session.read_memory(return_addr, width as u32, true)?;
        Ok(match return_type {
            CType::Void => ReturnValue::Void,
            CType::I8 | CType::I16 | CType::I32 => {
                ReturnValue::I32(i32::from_le_bytes(bytes[0..4].try_into().unwrap()))
            }
            CType::U8 | CType::U16 | CType::U32 => {
                ReturnValue::U32(u32::from_le_bytes(bytes[0..4].try_into().unwrap()))
            }
            CType::I64 => ReturnValue::I64(i64::from_le_bytes(bytes[0..8].try_into().unwrap())),
            CType::U64 => ReturnValue::U64(u64::from_le_bytes(bytes[0..8].try_into().unwrap())),
            CType::F32 => ReturnValue::F32(f32::from_le_bytes(bytes[0..4].try_into().unwrap())),
            CType::F64 => ReturnValue::F64(f64::from_le_bytes(bytes[0..8].try_into().unwrap())),
            CType::Pointer(_) => {
                ReturnValue::Pointer(u32::from_le_bytes(bytes[0..4].try_into().unwrap()))
            }
        })
    }

    /// Releases every allocation this call made, swallowing individual
    /// free failures so the rest still run (spec.md §4.8, §7).
    /// Idempotent: a `Marshaller` that has already been cleaned up (or
    /// never allocated anything) is a no-op.
    pub fn cleanup(&mut self, session: &mut DeviceSession) {
        for addr in self.allocations.drain(..) {
            if let Err(e) = session.free(addr) {
                warn!("failed to free marshalled allocation {addr:#010x}: {e}");
            }
        }
        self.tracked.clear();
    }

    /// Number of device allocations made by `pack` so far that have
    /// not yet been released by `cleanup`. Exposed for the "cleanup
    /// totality" property (spec.md §8, property 7).
    pub fn pending_allocation_count(&self) -> usize {
        self.allocations.len()
    }
}

impl Default for Marshaller<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_arity(signature: &Signature, args: &[Argument]) -> Result<()> {
    if args.len() != signature.parameters.len() {
        return Err(MarshalError::ArityMismatch {
            expected: signature.parameters.len(),
            got: args.len(),
        });
    }
    Ok(())
}

fn pointee_of(ty: &CType) -> CType {
    match ty {
        CType::Pointer(inner) => (**inner).clone(),
        other => other.clone(),
    }
}

fn pack_scalar(scalar: ScalarArg) -> Vec<u8> {
    match scalar {
        ScalarArg::I32(v) => v.to_le_bytes().to_vec(),
        ScalarArg::U32(v) => v.to_le_bytes().to_vec(),
        ScalarArg::I64(v) => v.to_le_bytes().to_vec(),
        ScalarArg::U64(v) => v.to_le_bytes().to_vec(),
        ScalarArg::F32(v) => v.to_le_bytes().to_vec(),
        ScalarArg::F64(v) => v.to_le_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use p4jit_proto::{CType, ParamCategory, Parameter};

    fn sum_i8_signature() -> Signature {
        Signature {
            name: "sum_i8".to_string(),
            return_type: CType::I32,
            parameters: vec![
                Parameter {
                    name: "a".to_string(),
                    ty: CType::Pointer(Box::new(CType::I8)),
                    category: ParamCategory::Pointer,
                },
                Parameter {
                    name: "n".to_string(),
                    ty: CType::I32,
                    category: ParamCategory::Value,
                },
            ],
        }
    }

    #[test]
    fn arity_mismatch_is_rejected_before_any_allocation() {
        // `pack()` itself needs a live `DeviceSession`, which can't be
        // constructed without a transport in this crate's test scope;
        // the array-argument path is covered end to end in
        // p4jit-runtime's integration tests. Here we only check the
        // argument-count guard, which runs before `session` is ever
        // touched.
        let sig = sum_i8_signature();
        let args: Vec<Argument> = vec![];
        let err = check_arity(&sig, &args).unwrap_err();
        assert!(matches!(err, MarshalError::ArityMismatch { expected: 2, got: 0 }));
    }

    #[test]
    fn pointer_dtype_matches_pointee_by_size() {
        let mut backing = Array1::from(vec![10i8, 20, 30]).into_dyn();
        let view = ArrayArg::I8(backing.view_mut());
        assert!(view.dtype().matches_pointee(&CType::I8));
    }
}
