//! Data types describing a finished build: the extracted binary plus
//! enough ELF introspection to let the orchestrator and metadata
//! builder reason about it without re-invoking `readelf`/`nm`.

use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Occupies space in the extracted binary (`.text`, `.rodata`, ...).
    Progbits,
    /// Zero-initialized, not present in the extracted binary (`.bss`).
    Nobits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionInfo {
    pub address: u32,
    pub size: u32,
    pub kind: SectionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Object,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u32,
    pub kind: SymbolKind,
}

/// The result of one compile-link-extract pass, ready for either
/// loading onto the device or for the two-pass orchestrator to use as
/// pass 1's size probe.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub binary: Vec<u8>,
    pub base_address: u32,
    pub entry_point: String,
    pub entry_address: u32,
    pub sections: BTreeMap<String, SectionInfo>,
    pub symbols: Vec<Symbol>,
    pub elf_path: PathBuf,
}

impl BuildArtifact {
    /// Total byte span from `base_address` to the end of the
    /// highest-addressed section, rounded up to cover trailing
    /// `.bss`. This is pass 1's "how big does the real allocation need
    /// to be" measurement (spec.md §4.6).
    pub fn total_size(&self) -> u32 {
        self.sections
            .values()
            .map(|s| s.address.saturating_add(s.size))
            .max()
            .map(|end| end.saturating_sub(self.base_address))
            .unwrap_or(0)
    }
}
