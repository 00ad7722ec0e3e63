//! Maps typedef and primitive-alias names (`uint32_t`, `size_t`, a
//! project's own `p4_word_t`, ...) onto [`CType`]. Seeded with the
//! aliases every stdint.h-using C file needs, and extensible from a
//! TOML document so a project can teach the extractor its own aliases.

use std::collections::HashMap;

use serde::Deserialize;

use crate::CType;

/// `name -> canonical type` entries as they appear in a TOML config,
/// e.g. `p4_word_t = "u32"` or `p4_buf_t = "pointer:u8"`.
#[derive(Debug, Deserialize)]
struct RawTypeMap {
    #[serde(default)]
    types: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct TypeMap {
    aliases: HashMap<String, CType>,
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TypeMap {
    /// The stdint.h / stddef.h aliases essentially every embedded C
    /// function signature is written against.
    pub fn with_defaults() -> Self {
        let mut aliases = HashMap::new();
        let defaults: &[(&str, CType)] = &[
            ("uint8_t", CType::U8),
            ("int8_t", CType::I8),
            ("uint16_t", CType::U16),
            ("int16_t", CType::I16),
            ("uint32_t", CType::U32),
            ("int32_t", CType::I32),
            ("uint64_t", CType::U64),
            ("int64_t", CType::I64),
            ("size_t", CType::U32),
            ("ssize_t", CType::I32),
            ("intptr_t", CType::U32),
            ("uintptr_t", CType::U32),
            ("bool", CType::U8),
            ("_Bool", CType::U8),
            ("wchar_t", CType::I32),
        ];
        for (name, ty) in defaults {
            aliases.insert((*name).to_string(), ty.clone());
        }
        Self { aliases }
    }

    /// Parses a TOML document of the form:
    ///
    /// ```toml
    /// [types]
    /// p4_word_t = "u32"
    /// p4_buf_t = "pointer:u8"
    /// ```
    ///
    /// and merges it over the defaults, later entries winning.
    pub fn merge_toml(&mut self, source: &str) -> Result<(), toml::de::Error> {
        let raw: RawTypeMap = toml::from_str(source)?;
        for (name, spec) in raw.types {
            if let Some(ty) = parse_type_spec(&spec) {
                self.aliases.insert(name, ty);
            }
        }
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<CType> {
        self.aliases.get(name).cloned()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: CType) {
        self.aliases.insert(name.into(), ty);
    }
}

fn parse_type_spec(spec: &str) -> Option<CType> {
    if let Some(inner) = spec.strip_prefix("pointer:") {
        return Some(CType::Pointer(Box::new(parse_type_spec(inner)?)));
    }
    Some(match spec {
        "void" => CType::Void,
        "i8" => CType::I8,
        "u8" => CType::U8,
        "i16" => CType::I16,
        "u16" => CType::U16,
        "i32" => CType::I32,
        "u32" => CType::U32,
        "i64" => CType::I64,
        "u64" => CType::U64,
        "f32" => CType::F32,
        "f64" => CType::F64,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_stdint_aliases() {
        let map = TypeMap::with_defaults();
        assert_eq!(map.resolve("uint32_t"), Some(CType::U32));
        assert_eq!(map.resolve("int64_t"), Some(CType::I64));
        assert_eq!(map.resolve("nonexistent_t"), None);
    }

    #[test]
    fn merge_toml_adds_project_aliases() {
        let mut map = TypeMap::with_defaults();
        map.merge_toml(
            r#"
            [types]
            p4_word_t = "u32"
            p4_buf_t = "pointer:u8"
            "#,
        )
        .unwrap();
        assert_eq!(map.resolve("p4_word_t"), Some(CType::U32));
        assert_eq!(
            map.resolve("p4_buf_t"),
            Some(CType::Pointer(Box::new(CType::U8)))
        );
    }

    #[test]
    fn merge_toml_overrides_default_on_conflict() {
        let mut map = TypeMap::with_defaults();
        map.merge_toml(
            r#"
            [types]
            size_t = "u64"
            "#,
        )
        .unwrap();
        assert_eq!(map.resolve("size_t"), Some(CType::U64));
    }
}
