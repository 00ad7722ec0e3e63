//! Ties the build pipeline, the device session, and the marshaller
//! together into the two user-facing entry points: [`JitClient`], and
//! the [`LoadedFunction`] handles it produces.

mod error;
mod handle;
mod orchestrator;

pub use error::{Result, RuntimeError};
pub use handle::LoadedFunction;
pub use orchestrator::{LoadOptions, PASS1_ARG_BASE, PASS1_CODE_BASE};

use std::path::{Path, PathBuf};

use p4jit_build::{Builder, ToolchainConfig};
use p4jit_proto::TypeMap;
use p4jit_session::DeviceSession;

/// Owns the device connection and the build pipeline and is the
/// single place a caller reaches for to turn C source into a callable
/// [`LoadedFunction`] — the facade `p4jit.py`'s `JitClient` plays in
/// `original_source`, rebuilt around this crate's two-pass orchestrator.
pub struct JitClient {
    session: DeviceSession,
    builder: Builder,
    type_map: TypeMap,
}

impl JitClient {
    pub fn new(session: DeviceSession, config: ToolchainConfig) -> Result<Self> {
        Ok(Self {
            session,
            builder: Builder::new(config)?,
            type_map: TypeMap::default(),
        })
    }

    /// Connects to `port` and builds a client around it using
    /// `config`'s toolchain settings.
    pub fn connect(port: &str, config: ToolchainConfig) -> Result<Self> {
        let session = DeviceSession::connect_default(port)?;
        Self::new(session, config)
    }

    /// Probes every candidate serial port and connects to the first
    /// device that answers the handshake.
    pub fn connect_auto(config: ToolchainConfig) -> Result<Self> {
        let session = DeviceSession::connect_auto()?;
        Self::new(session, config)
    }

    pub fn type_map_mut(&mut self) -> &mut TypeMap {
        &mut self.type_map
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Runs the full two-pass build-allocate-upload pipeline for
    /// `function_name`, defined somewhere in `source_dir` with its
    /// definition reachable from `entry_source`, and returns a handle
    /// ready to call. `options` controls the two device allocations'
    /// capability flags and alignment (spec.md §4.7, §4.9).
    pub fn load(
        &mut self,
        source_dir: &Path,
        entry_source: &Path,
        function_name: &str,
        options: &LoadOptions,
    ) -> Result<LoadedFunction<'_>> {
        let result = orchestrator::load(
            &mut self.session,
            &self.builder,
            source_dir,
            entry_source,
            function_name,
            &self.type_map,
            options,
        )?;
        Ok(LoadedFunction::new(
            &mut self.session,
            result.build,
            result.code_addr,
            result.args_addr,
        ))
    }

    /// Convenience wrapper over [`JitClient::load`] using the default
    /// [`LoadOptions`] and treating `entry_source` as its own
    /// containing directory's only search root.
    pub fn load_default(
        &mut self,
        entry_source: &Path,
        function_name: &str,
    ) -> Result<LoadedFunction<'_>> {
        let source_dir: PathBuf = entry_source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.load(&source_dir, entry_source, function_name, &LoadOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_options_default_is_usable_as_a_const_value() {
        let a = LoadOptions::default();
        let b = LoadOptions::default();
        assert_eq!(a.code_caps, b.code_caps);
    }
}
