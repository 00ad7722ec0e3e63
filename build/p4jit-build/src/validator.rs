//! Pre- and post-build checks, supplemented from `original_source`'s
//! `validator.py` (dropped from spec.md's component table but
//! referenced by its invariants — this is where `BuildInvariant`
//! actually gets raised, per spec.md §4.5).

use std::collections::BTreeMap;
use std::path::Path;

use crate::artifact::SectionInfo;
use crate::config::MemoryConfig;
use crate::error::{BuildError, Result};

pub struct Validator {
    max_size: u32,
    alignment: u32,
}

impl Validator {
    pub fn new(memory: &MemoryConfig) -> Result<Self> {
        Ok(Self {
            max_size: memory.max_size_bytes()?,
            alignment: memory.alignment,
        })
    }

    pub fn validate_source(&self, source: &Path) -> Result<()> {
        if !source.exists() {
            return Err(BuildError::SourceNotFound(source.to_path_buf()));
        }
        Ok(())
    }

    pub fn validate_entry_point(&self, entry_point: &str) -> Result<()> {
        let valid = !entry_point.is_empty()
            && entry_point
                .chars()
                .next()
                .map(|c| c.is_ascii_alphabetic() || c == '_')
                .unwrap_or(false)
            && entry_point.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(BuildError::InvalidEntryPoint(entry_point.to_string()));
        }
        Ok(())
    }

    pub fn validate_address(&self, address: u32) -> Result<()> {
        if address % self.alignment != 0 {
            return Err(BuildError::Misaligned {
                address,
                alignment: self.alignment,
            });
        }
        Ok(())
    }

    /// Confirms every section lies within `[base_address, base_address
    /// + total_size)` and that `total_size` fits the configured
    /// maximum (spec.md §4.5 invariants).
    pub fn validate_output(
        &self,
        sections: &BTreeMap<String, SectionInfo>,
        base_address: u32,
        total_size: u32,
    ) -> Result<()> {
        if total_size > self.max_size {
            return Err(BuildError::BuildInvariant(format!(
                "total size {total_size} exceeds configured maximum {}",
                self.max_size
            )));
        }
        let end = base_address.saturating_add(total_size);
        for (name, info) in sections {
            if info.size == 0 {
                continue;
            }
            if info.address < base_address {
                return Err(BuildError::BuildInvariant(format!(
                    "section {name} at {:#010x} lies below base address {base_address:#010x}",
                    info.address
                )));
            }
            let section_end = info.address.saturating_add(info.size);
            if section_end > end {
                return Err(BuildError::BuildInvariant(format!(
                    "section {name} ends at {section_end:#010x}, past the artifact's end {end:#010x}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::SectionKind;

    fn memory_config() -> MemoryConfig {
        MemoryConfig {
            max_size: "1K".to_string(),
            alignment: 16,
        }
    }

    #[test]
    fn rejects_misaligned_address() {
        let v = Validator::new(&memory_config()).unwrap();
        assert!(v.validate_address(0x1004).is_err());
        assert!(v.validate_address(0x1000).is_ok());
    }

    #[test]
    fn rejects_invalid_entry_point_identifiers() {
        let v = Validator::new(&memory_config()).unwrap();
        assert!(v.validate_entry_point("").is_err());
        assert!(v.validate_entry_point("1bad").is_err());
        assert!(v.validate_entry_point("call_remote").is_ok());
    }

    #[test]
    fn rejects_section_past_total_size() {
        let v = Validator::new(&memory_config()).unwrap();
        let mut sections = BTreeMap::new();
        sections.insert(
            ".text".to_string(),
            SectionInfo {
                address: 0x1000,
                size: 2048,
                kind: SectionKind::Progbits,
            },
        );
        let err = v.validate_output(&sections, 0x1000, 512).unwrap_err();
        assert!(matches!(err, BuildError::BuildInvariant(_)));
    }

    #[test]
    fn accepts_sections_within_bounds() {
        let v = Validator::new(&memory_config()).unwrap();
        let mut sections = BTreeMap::new();
        sections.insert(
            ".text".to_string(),
            SectionInfo {
                address: 0x1000,
                size: 256,
                kind: SectionKind::Progbits,
            },
        );
        assert!(v.validate_output(&sections, 0x1000, 512).is_ok());
    }
}
