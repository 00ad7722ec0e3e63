//! The Two-Pass Orchestrator (spec.md §4.7): pass 1 probes the size a
//! build needs at a provisional address, the session allocates code
//! and argument-buffer storage at the device's real addresses, and
//! pass 2 recompiles the wrapper to reference those exact addresses
//! before the final blob is uploaded.
//!
//! Any failure after the first device allocation releases every
//! allocation this call made before the error is returned (spec.md
//! §4.7, §7) — the same deferred-release idiom the marshaller uses for
//! `pack` (Design Notes §9: "use the target language's scoped-release
//! construct").

use std::path::Path;

use log::{debug, warn};
use p4jit_build::{BuildOutput, Builder};
use p4jit_proto::{caps, TypeMap};
use p4jit_session::DeviceSession;

use crate::error::{Result, RuntimeError};

/// Provisional addresses pass 1 builds against. Never uploaded or
/// executed — only used to measure `total_size` and the slot layout,
/// both of which are address-independent except for pass 2's
/// address-dependent immediates (Design Notes §9).
pub const PASS1_CODE_BASE: u32 = 0x4000_0000;
pub const PASS1_ARG_BASE: u32 = 0x5000_0000;

/// Caller-chosen memory properties for the two allocations a load
/// needs. Defaults match `original_source`'s `p4jit.py` defaults: code
/// executable out of internal RAM, argument buffer in SPI-RAM.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub code_caps: u32,
    pub code_alignment: u32,
    pub args_caps: u32,
    pub args_alignment: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            code_caps: caps::EXEC | caps::INTERNAL | caps::BIT32,
            code_alignment: 4,
            args_caps: caps::DEFAULT_ARRAY,
            args_alignment: 16,
        }
    }
}

/// Result of a successful two-pass load: the final artifact, its slot
/// metadata, and the two device addresses it now occupies.
pub struct LoadResult {
    pub build: BuildOutput,
    pub code_addr: u32,
    pub args_addr: u32,
}

/// Runs the full pass-1/pass-2 pipeline and leaves the final code blob
/// uploaded to the device. Returns the two addresses the caller must
/// eventually free (normally via a [`crate::LoadedFunction`]).
pub fn load(
    session: &mut DeviceSession,
    builder: &Builder,
    source_dir: &Path,
    entry_source: &Path,
    function_name: &str,
    type_map: &TypeMap,
    options: &LoadOptions,
) -> Result<LoadResult> {
    let safety_margin = builder.config().orchestrator.safety_margin;

    let pass1 = builder.build_with_wrapper(
        source_dir,
        entry_source,
        function_name,
        type_map,
        PASS1_CODE_BASE,
        PASS1_ARG_BASE,
    )?;
    let pass1_size = pass1.artifact.total_size();
    debug!("pass 1: {function_name} needs {pass1_size} bytes (+{safety_margin} margin)");

    let mut made: Vec<u32> = Vec::new();
    match load_with_known_size(
        session,
        builder,
        source_dir,
        entry_source,
        function_name,
        type_map,
        options,
        pass1_size,
        safety_margin,
        &pass1,
        &mut made,
    ) {
        Ok(result) => Ok(result),
        Err(e) => {
            for addr in made {
                if let Err(free_err) = session.free(addr) {
                    warn!("two-pass load failed and releasing {addr:#010x} also failed: {free_err}");
                }
            }
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn load_with_known_size(
    session: &mut DeviceSession,
    builder: &Builder,
    source_dir: &Path,
    entry_source: &Path,
    function_name: &str,
    type_map: &TypeMap,
    options: &LoadOptions,
    pass1_size: u32,
    safety_margin: u32,
    pass1: &BuildOutput,
    made: &mut Vec<u32>,
) -> Result<LoadResult> {
    let code_size = pass1_size.saturating_add(safety_margin);
    let code_addr = session.allocate(code_size, options.code_caps, options.code_alignment)?;
    made.push(code_addr);

    let args_size = pass1.metadata.addresses.args_array_bytes;
    let args_addr = session.allocate(args_size, options.args_caps, options.args_alignment)?;
    made.push(args_addr);

    let pass2 = builder.build_with_wrapper(
        source_dir,
        entry_source,
        function_name,
        type_map,
        code_addr,
        args_addr,
    )?;

    let pass2_size = pass2.artifact.total_size();
    if pass2_size > pass1_size.saturating_add(safety_margin) {
        return Err(RuntimeError::SafetyMarginExceeded {
            grew: pass2_size.saturating_sub(pass1_size),
            margin: safety_margin,
        });
    }

    session.write_memory(code_addr, &pass2.artifact.binary, false)?;

    debug!(
        "loaded {function_name} at code={code_addr:#010x} args={args_addr:#010x} ({pass2_size} bytes)"
    );

    Ok(LoadResult {
        build: pass2,
        code_addr,
        args_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_request_executable_internal_code() {
        let opts = LoadOptions::default();
        assert_ne!(opts.code_caps & caps::EXEC, 0);
        assert_ne!(opts.code_caps & caps::INTERNAL, 0);
        assert_ne!(opts.args_caps & caps::SPIRAM, 0);
    }
}
