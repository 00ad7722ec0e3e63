//! The Loaded-Function Handle (spec.md §4.9): binds a session, a built
//! artifact, and the two device allocations it occupies into a single
//! lifecycle object. `free` is idempotent and releases both
//! allocations; `call` refuses to run at all once invalid.

use log::warn;
use p4jit_build::BuildOutput;
use p4jit_proto::CType;
use p4jit_marshal::{Argument, Marshaller, ReturnValue};
use p4jit_session::DeviceSession;

use crate::error::{Result, RuntimeError};

/// A function loaded onto the device and ready to call. Borrows the
/// session it was loaded through for as long as it's valid — spec.md
/// §5 forbids sharing a session across threads, so there is never a
/// second owner to race with.
pub struct LoadedFunction<'s> {
    session: &'s mut DeviceSession,
    build: BuildOutput,
    code_addr: u32,
    args_addr: u32,
    valid: bool,
}

impl<'s> LoadedFunction<'s> {
    pub(crate) fn new(
        session: &'s mut DeviceSession,
        build: BuildOutput,
        code_addr: u32,
        args_addr: u32,
    ) -> Self {
        Self {
            session,
            build,
            code_addr,
            args_addr,
            valid: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.build.metadata.name
    }

    pub fn code_addr(&self) -> u32 {
        self.code_addr
    }

    pub fn args_addr(&self) -> u32 {
        self.args_addr
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Smart-args call: packs `args` against the function's signature
    /// into a fresh per-call [`Marshaller`], writes the slot buffer,
    /// triggers execution, reads back arrays and the return value, and
    /// always runs `cleanup` — regardless of which step failed (spec.md
    /// §4.9, §4.8's ordering guarantee).
    pub fn call(&mut self, args: Vec<Argument<'_>>) -> Result<ReturnValue> {
        if !self.valid {
            return Err(RuntimeError::FunctionReleased);
        }

        let mut marshaller = Marshaller::new();
        let slot_count = self.build.metadata.addresses.args_array_size;
        let result = self.call_inner(&mut marshaller, args, slot_count);
        marshaller.cleanup(self.session);
        result
    }

    fn call_inner(
        &mut self,
        marshaller: &mut Marshaller<'_>,
        args: Vec<Argument<'_>>,
        slot_count: u32,
    ) -> Result<ReturnValue> {
        let signature = self.build.signature.clone();
        let bytes = marshaller.pack(self.session, &signature, slot_count, args)?;
        self.session.write_memory(self.args_addr, &bytes, false)?;
        self.session.execute(self.build.artifact.entry_address)?;
        marshaller.sync_back(self.session);
        let return_addr = self.build.metadata.result.address;
        let value = marshaller.read_return(self.session, &signature.return_type, return_addr)?;
        Ok(value)
    }

    /// Raw-args call: writes an opaque, already-packed byte buffer to
    /// the args allocation and returns the device's 32-bit return slot
    /// verbatim, bypassing the marshaller entirely (spec.md §4.9).
    pub fn call_raw(&mut self, packed_args: &[u8]) -> Result<u32> {
        if !self.valid {
            return Err(RuntimeError::FunctionReleased);
        }
        self.session.write_memory(self.args_addr, packed_args, false)?;
        Ok(self.session.execute(self.build.artifact.entry_address)?)
    }

    pub fn return_type(&self) -> &CType {
        &self.build.signature.return_type
    }

    /// Releases both device allocations and marks the handle invalid.
    /// Idempotent: calling `free` again on an already-freed handle is a
    /// no-op. Individual free failures are logged, not propagated
    /// (spec.md §4.9).
    pub fn free(&mut self) {
        if !self.valid {
            return;
        }
        if let Err(e) = self.session.free(self.code_addr) {
            warn!("freeing code allocation {:#010x} failed: {e}", self.code_addr);
        }
        if let Err(e) = self.session.free(self.args_addr) {
            warn!("freeing args allocation {:#010x} failed: {e}", self.args_addr);
        }
        self.valid = false;
    }
}

impl Drop for LoadedFunction<'_> {
    fn drop(&mut self) {
        self.free();
    }
}
