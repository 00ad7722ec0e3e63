use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("no compilable source files found in {0}")]
    NoSourceFiles(PathBuf),

    #[error("unknown file extension {ext:?} (supported: {supported:?})")]
    UnknownExtension { ext: String, supported: Vec<String> },

    #[error("invalid entry point name: {0:?}")]
    InvalidEntryPoint(String),

    #[error("address {address:#010x} is not {alignment}-byte aligned")]
    Misaligned { address: u32, alignment: u32 },

    #[error("compiling {file} failed:\n{stderr}")]
    CompileFailed { file: PathBuf, stderr: String },

    #[error("linking failed:\n{0}")]
    LinkFailed(String),

    #[error("binary extraction failed:\n{0}")]
    ExtractFailed(String),

    #[error("symbol/section listing failed:\n{0}")]
    ToolFailed(String),

    #[error("entry point {0:?} not found in compiled binary")]
    EntryNotFound(String),

    #[error("firmware ELF not found at {0}")]
    FirmwareElfNotFound(PathBuf),

    #[error("build invariant violated: {0}")]
    BuildInvariant(String),

    #[error(transparent)]
    Signature(#[from] p4jit_signature::SignatureError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildError>;
