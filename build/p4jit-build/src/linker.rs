//! Generates the per-build linker script, the same way the teacher
//! writes its `memory.x` (`build/xtask/src/dist.rs::
//! generate_bootloader_linker_script`): direct `writeln!` calls into a
//! `File`, no templating crate.

use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Writes a linker script that places `.text`/`.rodata`/`.data` at
/// `load_address` and leaves `.bss` to follow, matching
/// `original_source`'s `linker_gen.py` layout (single RAM region, no
/// relocation of read-only data away from code).
pub fn write_linker_script(path: &Path, load_address: u32, region_size: u32) -> Result<()> {
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "MEMORY")?;
    writeln!(file, "{{")?;
    writeln!(
        file,
        "  RAM (rwx) : ORIGIN = 0x{load_address:08x}, LENGTH = 0x{region_size:08x}"
    )?;
    writeln!(file, "}}")?;
    writeln!(file)?;
    writeln!(file, "SECTIONS")?;
    writeln!(file, "{{")?;
    writeln!(file, "  . = 0x{load_address:08x};")?;
    writeln!(file)?;
    writeln!(file, "  .text : {{")?;
    writeln!(file, "    KEEP(*(.text.entry))")?;
    writeln!(file, "    *(.text .text.*)")?;
    writeln!(file, "  }} > RAM")?;
    writeln!(file)?;
    writeln!(file, "  .rodata : {{")?;
    writeln!(file, "    *(.rodata .rodata.*)")?;
    writeln!(file, "  }} > RAM")?;
    writeln!(file)?;
    writeln!(file, "  .data : {{")?;
    writeln!(file, "    *(.data .data.*)")?;
    writeln!(file, "  }} > RAM")?;
    writeln!(file)?;
    writeln!(file, "  .bss (NOLOAD) : {{")?;
    writeln!(file, "    *(.bss .bss.* COMMON)")?;
    writeln!(file, "  }} > RAM")?;
    writeln!(file)?;
    writeln!(file, "  /DISCARD/ : {{")?;
    writeln!(file, "    *(.comment)")?;
    writeln!(file, "    *(.note.*)")?;
    writeln!(file, "  }}")?;
    writeln!(file, "}}")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_places_origin_at_requested_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.x");
        write_linker_script(&path, 0x4008_0000, 0x2000).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ORIGIN = 0x40080000"));
        assert!(text.contains("LENGTH = 0x00002000"));
        assert!(text.contains(". = 0x40080000;"));
    }
}
