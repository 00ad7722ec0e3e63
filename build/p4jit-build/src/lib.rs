//! The host-side build pipeline: turns a directory of C source plus a
//! target function name into a `BuildArtifact` ready for upload,
//! alongside the slot-layout [`Metadata`] the marshaller and runtime
//! need to talk to it. Mirrors `original_source`'s `builder.py`, with
//! its helpers split one-per-module the way the teacher's `xtask`
//! splits `dist.rs`/`config.rs`/`signing.rs`.

mod artifact;
mod compiler;
mod config;
mod discover;
mod error;
mod linker;
mod metadata;
mod validator;

pub use artifact::{BuildArtifact, SectionInfo, SectionKind, Symbol, SymbolKind};
pub use compiler::Compiler;
pub use config::{
    CompilerConfig, ExtensionsConfig, LinkerConfig, MemoryConfig, OrchestratorConfig, Toolchain,
    ToolchainConfig, WrapperConfig, DEFAULT_SAFETY_MARGIN,
};
pub use discover::discover_source_files;
pub use error::{BuildError, Result};
pub use metadata::{
    AddressesMetadata, ArgumentAddress, FunctionMetadata, Metadata, MetadataBuilder,
    ParamCategoryRepr, ReturnAddress,
};
pub use p4jit_signature::SignatureError;
pub use validator::Validator;

use std::path::Path;

use p4jit_proto::{Signature, TypeMap};
use tempfile::TempDir;

/// Everything one compile-link-extract pass produces: the artifact
/// ready for upload and the metadata describing how to call into it.
pub struct BuildOutput {
    pub artifact: BuildArtifact,
    pub metadata: Metadata,
    pub signature: Signature,
}

pub struct Builder {
    config: ToolchainConfig,
    compiler: Compiler,
    work_dir: TempDir,
}

impl Builder {
    pub fn new(config: ToolchainConfig) -> Result<Self> {
        let work_dir = TempDir::new()?;
        let compiler = Compiler::new(config.clone());
        Ok(Self {
            config,
            compiler,
            work_dir,
        })
    }

    /// Runs one full pass: discover, extract the target's signature,
    /// synthesize the wrapper, compile everything, link at
    /// `base_address`, extract a flat binary, and compute the slot
    /// metadata. Pass 1 and pass 2 of the orchestrator are both single
    /// calls to this with different addresses (spec.md §4.7) — the
    /// two-pass loop itself lives in the runtime crate, which also
    /// owns the device allocation between the two calls.
    pub fn build_with_wrapper(
        &self,
        source_dir: &Path,
        entry_source: &Path,
        function_name: &str,
        type_map: &TypeMap,
        base_address: u32,
        arg_base: u32,
    ) -> Result<BuildOutput> {
        let validator = Validator::new(&self.config.memory)?;
        validator.validate_source(entry_source)?;
        validator.validate_entry_point(&self.config.wrapper.wrapper_entry)?;
        validator.validate_address(base_address)?;

        let entry_text = std::fs::read_to_string(entry_source)?;
        let signature = p4jit_signature::extract(
            &entry_text,
            function_name,
            type_map,
            self.config.wrapper.args_array_size,
        )?;

        let entry_basename = entry_source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("source.c")
            .to_string();

        let wrapper = p4jit_wrapper::synthesize(
            &signature,
            &entry_basename,
            &self.config.wrapper.wrapper_entry,
            self.config.wrapper.args_array_size,
            arg_base,
        );

        let wrapper_path = self.work_dir.path().join(&wrapper.wrapper_filename);
        let header_path = self.work_dir.path().join(&wrapper.header_filename);
        std::fs::write(&wrapper_path, &wrapper.wrapper_source)?;
        std::fs::write(&header_path, &wrapper.header_source)?;

        let mut sources = discover_source_files(source_dir, &self.config.extensions);
        if !sources.iter().any(|p| p == entry_source) {
            sources.push(entry_source.to_path_buf());
        }
        sources.push(wrapper_path.clone());

        let mut objects = Vec::with_capacity(sources.len());
        for source in &sources {
            let stem = source
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("obj");
            let obj_path = self.work_dir.path().join(format!("{stem}.o"));
            self.compiler.compile(source, &obj_path)?;
            objects.push(obj_path);
        }

        let region_size = self.config.memory.max_size_bytes()?;
        let linker_script_path = self.work_dir.path().join("link.x");
        linker::write_linker_script(&linker_script_path, base_address, region_size)?;

        let elf_path = self.work_dir.path().join("output.elf");
        self.compiler.link(&objects, &linker_script_path, &elf_path)?;

        let bin_path = self.work_dir.path().join("output.bin");
        let mut binary = self.compiler.extract_binary(&elf_path, &bin_path)?;

        let sections = self.compiler.list_sections(&elf_path)?;
        let symbols = self.compiler.list_symbols(&elf_path)?;

        pad_binary(&mut binary, &sections);

        let total_size = sections
            .values()
            .map(|s| s.address.saturating_add(s.size))
            .max()
            .map(|end| end.saturating_sub(base_address))
            .unwrap_or(0);
        validator.validate_output(&sections, base_address, total_size)?;

        let entry_address = symbols
            .iter()
            .find(|s| s.name == self.config.wrapper.wrapper_entry && s.kind == SymbolKind::Function)
            .map(|s| s.address)
            .ok_or_else(|| BuildError::EntryNotFound(self.config.wrapper.wrapper_entry.clone()))?;

        let artifact = BuildArtifact {
            binary,
            base_address,
            entry_point: self.config.wrapper.wrapper_entry.clone(),
            entry_address,
            sections,
            symbols,
            elf_path,
        };

        let metadata = MetadataBuilder {
            signature: signature.clone(),
            arg_base,
            code_base: base_address,
            args_array_size: self.config.wrapper.args_array_size,
            wrapper_entry: self.config.wrapper.wrapper_entry.clone(),
        }
        .build();

        Ok(BuildOutput {
            artifact,
            metadata,
            signature,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }
}

/// Aligns `binary` to 4 bytes, then appends zeros covering every
/// `NOBITS` (`.bss`) section so the flat image's length equals
/// `total_size` (spec.md §4.5's invariant), matching
/// `binary_processor.py::pad_bss`.
fn pad_binary(binary: &mut Vec<u8>, sections: &std::collections::BTreeMap<String, SectionInfo>) {
    let alignment_padding = (4 - (binary.len() % 4)) % 4;
    let bss_size: u32 = sections
        .values()
        .filter(|s| s.kind == SectionKind::Nobits)
        .map(|s| s.size)
        .sum();
    binary.resize(binary.len() + alignment_padding, 0);
    binary.resize(binary.len() + bss_size as usize, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn pad_binary_aligns_and_appends_bss() {
        let mut binary = vec![1, 2, 3];
        let mut sections = BTreeMap::new();
        sections.insert(
            ".bss".to_string(),
            SectionInfo {
                address: 0x1000,
                size: 4,
                kind: SectionKind::Nobits,
            },
        );
        pad_binary(&mut binary, &sections);
        assert_eq!(binary.len(), 8);
        assert!(binary[3..].iter().all(|&b| b == 0));
    }
}
