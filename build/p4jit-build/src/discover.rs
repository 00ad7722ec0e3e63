//! Finds every compilable source file next to a build's entry source,
//! mirroring `original_source`'s `builder.py::_discover_source_files`
//! (glob by configured extension, sorted for a deterministic build
//! order).

use std::path::{Path, PathBuf};

use crate::config::ExtensionsConfig;

pub fn discover_source_files(source_dir: &Path, extensions: &ExtensionsConfig) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(source_dir) {
        Ok(entries) => entries,
        Err(_) => return found,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let dotted = format!(".{ext}");
        if extensions.compile.contains_key(&dotted) {
            found.push(path);
        }
    }
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn discovers_and_sorts_matching_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.c"), "").unwrap();
        std::fs::write(dir.path().join("a.c"), "").unwrap();
        std::fs::write(dir.path().join("ignore.txt"), "").unwrap();

        let mut compile = HashMap::new();
        compile.insert(".c".to_string(), "gcc".to_string());
        let extensions = ExtensionsConfig { compile };

        let found = discover_source_files(dir.path(), &extensions);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.c", "b.c"]);
    }
}
