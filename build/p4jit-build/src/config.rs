//! The build-time configuration document (spec.md §6's configuration
//! table), deserialized from TOML the way the teacher's own
//! `app.toml`/`Config` does (`build/xtask/src/config.rs`:
//! `#[serde(rename_all = "kebab-case", deny_unknown_fields)]`).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Bytes of slack the Two-Pass Orchestrator reserves on the code
/// allocation beyond pass 1's measured `total_size` (Design Notes §9:
/// "the safety margin ... configurable, on the order of tens of
/// bytes"). Matches `original_source`'s `p4jit.py`: `total_size + 64`.
pub const DEFAULT_SAFETY_MARGIN: u32 = 64;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ToolchainConfig {
    pub toolchain: Toolchain,
    pub compiler: CompilerConfig,
    pub linker: LinkerConfig,
    pub memory: MemoryConfig,
    pub extensions: ExtensionsConfig,
    pub wrapper: WrapperConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Toolchain {
    pub path: PathBuf,
    pub prefix: String,
    pub compilers: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompilerConfig {
    pub arch: String,
    pub abi: String,
    pub optimization: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LinkerConfig {
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub garbage_collection: bool,
    pub firmware_elf: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MemoryConfig {
    /// e.g. `"128K"`, `"1M"`, or a plain byte count.
    pub max_size: String,
    pub alignment: u32,
}

impl MemoryConfig {
    /// Parses [`Self::max_size`] into bytes, per
    /// `original_source`'s `validator.py::_parse_size`.
    pub fn max_size_bytes(&self) -> Result<u32, BuildError> {
        parse_size(&self.max_size)
    }
}

/// Parses a size string like `"128K"` or `"1M"` or a bare integer into
/// bytes.
pub fn parse_size(raw: &str) -> Result<u32, BuildError> {
    let trimmed = raw.trim().to_uppercase();
    let (digits, multiplier) = if let Some(d) = trimmed.strip_suffix('K') {
        (d, 1024)
    } else if let Some(d) = trimmed.strip_suffix('M') {
        (d, 1024 * 1024)
    } else {
        (trimmed.as_str(), 1)
    };
    let value: u32 = digits
        .parse()
        .map_err(|_| BuildError::InvalidConfig(format!("not a size: {raw:?}")))?;
    Ok(value * multiplier)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExtensionsConfig {
    /// File extension (including the leading dot, e.g. `".c"`) to the
    /// name of an entry in [`Toolchain::compilers`].
    pub compile: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WrapperConfig {
    pub args_array_size: u32,
    pub wrapper_entry: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct OrchestratorConfig {
    pub safety_margin: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}

impl ToolchainConfig {
    pub fn from_toml(source: &str) -> Result<Self, BuildError> {
        toml::from_str(source).map_err(|e| BuildError::InvalidConfig(e.to_string()))
    }

    /// A configuration with the riscv32 gcc toolchain `original_source`
    /// targets (ESP32-P4), useful for tests and as a starting point.
    pub fn esp32_p4_defaults() -> Self {
        let mut compilers = HashMap::new();
        compilers.insert("gcc".to_string(), "riscv32-esp-elf-gcc".to_string());
        compilers.insert("as".to_string(), "riscv32-esp-elf-as".to_string());

        let mut compile = HashMap::new();
        compile.insert(".c".to_string(), "gcc".to_string());
        compile.insert(".s".to_string(), "as".to_string());
        compile.insert(".S".to_string(), "as".to_string());

        Self {
            toolchain: Toolchain {
                path: PathBuf::new(),
                prefix: "riscv32-esp-elf".to_string(),
                compilers,
            },
            compiler: CompilerConfig {
                arch: "rv32imafc_zicsr_zifencei".to_string(),
                abi: "ilp32f".to_string(),
                optimization: "O2".to_string(),
                flags: vec!["-ffreestanding".to_string(), "-fno-builtin".to_string()],
            },
            linker: LinkerConfig {
                flags: vec!["-nostdlib".to_string()],
                garbage_collection: true,
                firmware_elf: None,
            },
            memory: MemoryConfig {
                max_size: "128K".to_string(),
                alignment: 4,
            },
            extensions: ExtensionsConfig { compile },
            wrapper: WrapperConfig {
                args_array_size: 32,
                wrapper_entry: "call_remote".to_string(),
            },
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_k_and_m_suffixed_sizes() {
        assert_eq!(parse_size("128K").unwrap(), 128 * 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("512").unwrap(), 512);
    }

    #[test]
    fn orchestrator_defaults_to_spec_margin() {
        let cfg = ToolchainConfig::esp32_p4_defaults();
        assert_eq!(cfg.orchestrator.safety_margin, DEFAULT_SAFETY_MARGIN);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = ToolchainConfig::esp32_p4_defaults();
        let text = toml::to_string(&cfg).unwrap();
        let parsed = ToolchainConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.wrapper.args_array_size, cfg.wrapper.args_array_size);
    }
}
