//! Locates a target function's definition in a C source file and
//! turns it into a structured [`p4jit_proto::Signature`], so the
//! wrapper synthesizer and argument marshaller never have to look at
//! raw C text themselves.

mod error;
mod parse;
mod scan;

pub use error::{Result, SignatureError};
pub use p4jit_proto::{CType, ParamCategory, Parameter, Signature, TypeMap};
pub use scan::{extract_typedefs, find_definition, strip_attributes};

/// Extracts `function_name`'s signature from `source`.
///
/// `max_slots` bounds the parameter count against the wrapper's fixed
/// `io[]` array size (see the build crate's wrapper synthesizer); a
/// signature needing more slots than that is rejected rather than
/// silently truncated.
pub fn extract(
    source: &str,
    function_name: &str,
    type_map: &TypeMap,
    max_slots: u32,
) -> Result<Signature> {
    let definition = scan::find_definition(source, function_name)?;
    let typedefs = scan::extract_typedefs(source);
    let unit = format!("{typedefs}\n{definition};\n");

    let signature = parse::parse_prototype(unit, type_map)?;

    let slots = signature.argument_slot_count() + signature.return_type.slot_count();
    if slots > max_slots {
        return Err(SignatureError::TooWide { slots, max: max_slots });
    }

    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4jit_proto::{CType, ParamCategory};

    #[test]
    fn extracts_simple_scalar_signature() {
        let src = "int add(int a, int b) {\n    return a + b;\n}\n";
        let type_map = TypeMap::with_defaults();
        let sig = extract(src, "add", &type_map, 32).unwrap();
        assert_eq!(sig.name, "add");
        assert_eq!(sig.return_type, CType::I32);
        assert_eq!(sig.parameters.len(), 2);
        assert_eq!(sig.parameters[0].category, ParamCategory::Value);
    }

    #[test]
    fn extracts_pointer_parameter_with_typedef() {
        let src = "typedef unsigned int uint32_t;\n\
                   void scale(uint32_t *buf, uint32_t len, float factor) {\n    (void)buf;\n}\n";
        let type_map = TypeMap::with_defaults();
        let sig = extract(src, "scale", &type_map, 32).unwrap();
        assert_eq!(sig.return_type, CType::Void);
        assert_eq!(sig.parameters[0].ty, CType::Pointer(Box::new(CType::U32)));
        assert_eq!(sig.parameters[0].category, ParamCategory::Pointer);
        assert_eq!(sig.parameters[2].ty, CType::F32);
    }

    #[test]
    fn array_declared_parameter_is_classified_as_pointer() {
        let src = "int sum_i8(int8_t a[], int n) {\n    return n;\n}\n";
        let type_map = TypeMap::with_defaults();
        let sig = extract(src, "sum_i8", &type_map, 32).unwrap();
        assert_eq!(sig.parameters[0].ty, CType::Pointer(Box::new(CType::I8)));
        assert_eq!(sig.parameters[0].category, ParamCategory::Pointer);
        assert_eq!(sig.parameters[1].category, ParamCategory::Value);
    }

    #[test]
    fn rejects_signature_wider_than_slot_budget() {
        let src = "int f(int a, int b, int c) {\n    return a + b + c;\n}\n";
        let type_map = TypeMap::with_defaults();
        let err = extract(src, "f", &type_map, 2).unwrap_err();
        assert!(matches!(err, SignatureError::TooWide { .. }));
    }

    #[test]
    fn lone_void_parameter_means_no_parameters() {
        let src = "int ping(void) {\n    return 1;\n}\n";
        let type_map = TypeMap::with_defaults();
        let sig = extract(src, "ping", &type_map, 32).unwrap();
        assert!(sig.parameters.is_empty());
    }

    #[test]
    fn reports_not_found_for_missing_function() {
        let src = "int other(void) { return 0; }\n";
        let type_map = TypeMap::with_defaults();
        let err = extract(src, "missing", &type_map, 32).unwrap_err();
        assert!(matches!(err, SignatureError::NotFound(_)));
    }
}
