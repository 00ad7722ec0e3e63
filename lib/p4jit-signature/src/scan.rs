//! Text-level heuristics for locating a function's *definition* in a
//! source file, as opposed to its forward declaration or any call
//! site that happens to share its name.

use regex::Regex;

use crate::error::{Result, SignatureError};

/// Platform attribute macros stripped before scanning, so they never
/// get mistaken for part of the return type or the function name.
const STRIP_ATTRIBUTES: &[&str] = &[
    "IRAM_ATTR",
    "DRAM_ATTR",
    "RTC_IRAM_ATTR",
    "RTC_DATA_ATTR",
    "RTC_FAST_ATTR",
    "DMA_ATTR",
    "EXT_RAM_ATTR",
    "EXT_RAM_BSS_ATTR",
    "NOINLINE_ATTR",
    "FORCE_INLINE_ATTR",
    "STATIC_INLINE_ATTR",
    "__attribute__((unused))",
    "__attribute__((always_inline))",
];

/// Removes every occurrence of every attribute macro in
/// [`STRIP_ATTRIBUTES`], as whole words.
pub fn strip_attributes(source: &str) -> String {
    let mut out = source.to_string();
    for attr in STRIP_ATTRIBUTES {
        let pattern = format!(r"\b{}\b", regex::escape(attr));
        let re = Regex::new(&pattern).expect("static attribute pattern is valid");
        out = re.replace_all(&out, "").into_owned();
    }
    out
}

/// Pulls out every `typedef ...;` statement verbatim, to be fed to the
/// C parser ahead of the synthesized prototype so typedef'd parameter
/// types resolve.
pub fn extract_typedefs(source: &str) -> String {
    let re = Regex::new(r"(?s)typedef\s+[^;]+;").expect("static typedef pattern is valid");
    re.find_iter(source)
        .map(|m| m.as_str().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Finds the full `return_type name(params)` text of the *defining*
/// occurrence of `function_name` in `source` — rejecting call sites
/// and plain forward declarations — and returns it with the trailing
/// `{` omitted.
pub fn find_definition(source: &str, function_name: &str) -> Result<String> {
    let cleaned = strip_attributes(source);
    let name_pattern = format!(r"\b{}\b", regex::escape(function_name));
    let name_re = Regex::new(&name_pattern).expect("escaped function name is a valid pattern");

    for m in name_re.find_iter(&cleaned) {
        let before = &cleaned[..m.start()];
        if looks_like_call_site(before) {
            continue;
        }

        let open_rel = match cleaned[m.end()..].find('(') {
            Some(idx) if cleaned[m.end()..m.end() + idx].trim().is_empty() => idx,
            _ => continue,
        };
        let close_rel = match balanced_paren_end(&cleaned[m.end()..], open_rel) {
            Some(idx) => idx,
            None => continue,
        };
        let signature_end = m.end() + close_rel + 1;

        let tail = cleaned[signature_end..].trim_start();
        if !tail.starts_with('{') {
            // A forward declaration (ends in `;`) or something stranger; keep looking.
            continue;
        }

        let stmt_start = cleaned[..m.start()]
            .rfind([';', '}'])
            .map(|i| i + 1)
            .unwrap_or(0);
        let signature = cleaned[stmt_start..signature_end].trim().to_string();
        return Ok(signature);
    }

    Err(SignatureError::NotFound(function_name.to_string()))
}

/// True when the text immediately preceding a name match looks like a
/// call rather than a definition: preceded by a control-flow keyword,
/// an assignment, an open paren, or a comma.
fn looks_like_call_site(before: &str) -> bool {
    let trimmed = before.trim_end();
    for keyword in ["if", "while", "for", "switch", "return"] {
        if let Some(rest) = trimmed.strip_suffix(keyword) {
            let boundary_ok = rest
                .chars()
                .last()
                .map(|c| !c.is_alphanumeric() && c != '_')
                .unwrap_or(true);
            if boundary_ok {
                return true;
            }
        }
    }
    trimmed.ends_with('=') || trimmed.ends_with('(') || trimmed.ends_with(',')
}

/// Returns the index (relative to `s`) of the `)` that closes the `(`
/// at `open_idx`, accounting for nesting. Does not attempt to dodge
/// parens inside string or character literals.
fn balanced_paren_end(s: &str, open_idx: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(open_idx) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_simple_definition() {
        let src = "int add(int a, int b) {\n    return a + b;\n}\n";
        let sig = find_definition(src, "add").unwrap();
        assert_eq!(sig, "int add(int a, int b)");
    }

    #[test]
    fn skips_forward_declaration_and_finds_definition() {
        let src = "int add(int a, int b);\n\nint add(int a, int b) {\n    return a + b;\n}\n";
        let sig = find_definition(src, "add").unwrap();
        assert_eq!(sig, "int add(int a, int b)");
    }

    #[test]
    fn skips_call_site() {
        let src = "void run() {\n    int r = add(1, 2);\n}\n\nint add(int a, int b) {\n    return a + b;\n}\n";
        let sig = find_definition(src, "add").unwrap();
        assert_eq!(sig, "int add(int a, int b)");
    }

    #[test]
    fn strips_attribute_macros_before_matching() {
        let src = "IRAM_ATTR int add(int a, int b) {\n    return a + b;\n}\n";
        let sig = find_definition(src, "add").unwrap();
        assert_eq!(sig, "int add(int a, int b)");
    }

    #[test]
    fn errors_when_only_a_call_site_exists() {
        let src = "void run() { int r = add(1, 2); }\n";
        assert!(find_definition(src, "add").is_err());
    }

    #[test]
    fn extracts_typedefs() {
        let src = "typedef unsigned int p4_word_t;\nint f(p4_word_t x) { return x; }\n";
        let preamble = extract_typedefs(src);
        assert_eq!(preamble, "typedef unsigned int p4_word_t;");
    }
}
