//! Generates the small C stub that becomes a build's link-time entry
//! point: it unpacks a fixed-width slot buffer into the target
//! function's real argument list, calls it, and writes the return
//! value back into the buffer's trailing slot(s).
//!
//! Also emits a header-guard-wrapped prototype header for the target
//! function (`original_source`'s `header_generator.py`), so the
//! wrapper and the original source can be compiled as separate
//! translation units without redeclaring the function by hand.

use p4jit_proto::{CType, ParamCategory, Signature};

/// The two generated files a [`synthesize`] call produces, plus the
/// names the caller should save them under (alongside the original
/// source file, so the compiler driver's directory-wide discovery
/// picks both up).
pub struct WrapperSource {
    pub wrapper_filename: String,
    pub wrapper_source: String,
    pub header_filename: String,
    pub header_source: String,
}

/// Synthesizes the wrapper and header for `signature`.
///
/// `source_basename` is the original source file's name (e.g.
/// `"biquad.c"`); the header is named after it (`"biquad.h"`), per
/// `header_generator.py`. `wrapper_entry` is the link-time entry
/// symbol name. `slot_count` is the `io[]` array length; `io_base` is
/// the address the wrapper should read/write through (pass 1 uses a
/// provisional value, pass 2 the device's real allocation).
pub fn synthesize(
    signature: &Signature,
    source_basename: &str,
    wrapper_entry: &str,
    slot_count: u32,
    io_base: u32,
) -> WrapperSource {
    let header_filename = header_name_for(source_basename);
    let wrapper_filename = format!("{}_p4jit_wrapper.c", signature.name);

    WrapperSource {
        wrapper_source: generate_wrapper_source(signature, &header_filename, wrapper_entry, slot_count, io_base),
        header_source: generate_header(signature, &header_filename),
        wrapper_filename,
        header_filename,
    }
}

fn header_name_for(source_basename: &str) -> String {
    match source_basename.rsplit_once('.') {
        Some((stem, _ext)) => format!("{stem}.h"),
        None => format!("{source_basename}.h"),
    }
}

fn header_guard(header_filename: &str) -> String {
    header_filename.to_uppercase().replace(['.', '-'], "_")
}

fn generate_header(signature: &Signature, header_filename: &str) -> String {
    let guard = header_guard(header_filename);
    let params = if signature.parameters.is_empty() {
        "void".to_string()
    } else {
        signature
            .parameters
            .iter()
            .map(|p| format!("{} {}", c_type_name(&p.ty), p.name))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "#ifndef {guard}\n\
         #define {guard}\n\
         \n\
         // Function declaration\n\
         {ret} {name}({params});\n\
         \n\
         #endif // {guard}\n",
        guard = guard,
        ret = c_type_name(&signature.return_type),
        name = signature.name,
        params = params,
    )
}

/// Returns the (C type name, slot count) this C type occupies, and
/// whether the slot buffer read/write must bit-reinterpret rather
/// than numerically cast (floats and 64-bit scalars do).
fn is_wide(ty: &CType) -> bool {
    ty.slot_count() == 2
}

fn is_float(ty: &CType) -> bool {
    matches!(ty, CType::F32 | CType::F64)
}

fn c_type_name(ty: &CType) -> String {
    match ty {
        CType::Void => "void".to_string(),
        CType::I8 => "int8_t".to_string(),
        CType::U8 => "uint8_t".to_string(),
        CType::I16 => "int16_t".to_string(),
        CType::U16 => "uint16_t".to_string(),
        CType::I32 => "int32_t".to_string(),
        CType::U32 => "uint32_t".to_string(),
        CType::I64 => "int64_t".to_string(),
        CType::U64 => "uint64_t".to_string(),
        CType::F32 => "float".to_string(),
        CType::F64 => "double".to_string(),
        CType::Pointer(inner) => format!("{}*", c_type_name(inner)),
    }
}

/// Emits the local-variable declarations and read-from-`io[]` lines
/// for one parameter, returning the expression to pass to the call.
fn unpack_parameter(idx: usize, slot: u32, category: ParamCategory, ty: &CType, body: &mut String) -> String {
    let var = format!("arg{idx}");

    if category == ParamCategory::Pointer {
        let inner = match ty {
            CType::Pointer(inner) => c_type_name(inner),
            other => c_type_name(other),
        };
        body.push_str(&format!(
            "    {inner} *{var} = ({inner} *)(uintptr_t)io[{slot}];\n"
        ));
        return var;
    }

    if is_float(ty) && is_wide(ty) {
        body.push_str(&format!(
            "    union {{ uint32_t u[2]; double f; }} bits{idx};\n\
             \x20   bits{idx}.u[0] = io[{slot}];\n\
             \x20   bits{idx}.u[1] = io[{slot1}];\n\
             \x20   double {var} = bits{idx}.f;\n",
            idx = idx,
            slot = slot,
            slot1 = slot + 1,
            var = var,
        ));
        return var;
    }
    if is_float(ty) {
        body.push_str(&format!(
            "    union {{ uint32_t u; float f; }} bits{idx};\n\
             \x20   bits{idx}.u = io[{slot}];\n\
             \x20   float {var} = bits{idx}.f;\n",
            idx = idx,
            slot = slot,
            var = var,
        ));
        return var;
    }
    if is_wide(ty) {
        let ctype = c_type_name(ty);
        body.push_str(&format!(
            "    union {{ uint32_t u[2]; {ctype} v; }} bits{idx};\n\
             \x20   bits{idx}.u[0] = io[{slot}];\n\
             \x20   bits{idx}.u[1] = io[{slot1}];\n\
             \x20   {ctype} {var} = bits{idx}.v;\n",
            ctype = ctype,
            idx = idx,
            slot = slot,
            slot1 = slot + 1,
            var = var,
        ));
        return var;
    }

    let ctype = c_type_name(ty);
    body.push_str(&format!("    {ctype} {var} = ({ctype})io[{slot}];\n"));
    var
}

/// Emits the lines that write the call's result into the trailing
/// return slot(s).
fn pack_return(ty: &CType, slot: u32, result_expr: &str, body: &mut String) {
    match ty {
        CType::Void => {}
        CType::Pointer(_) => {
            body.push_str(&format!(
                "    io[{slot}] = (uint32_t)(uintptr_t){result_expr};\n"
            ));
        }
        CType::F64 => {
            body.push_str(&format!(
                "    union {{ uint32_t u[2]; double f; }} rbits;\n\
                 \x20   rbits.f = (double){result_expr};\n\
                 \x20   io[{slot}] = rbits.u[0];\n\
                 \x20   io[{slot1}] = rbits.u[1];\n",
                slot = slot,
                slot1 = slot + 1,
            ));
        }
        CType::F32 => {
            body.push_str(&format!(
                "    union {{ uint32_t u; float f; }} rbits;\n\
                 \x20   rbits.f = (float){result_expr};\n\
                 \x20   io[{slot}] = rbits.u;\n"
            ));
        }
        CType::I64 | CType::U64 => {
            let ctype = c_type_name(ty);
            body.push_str(&format!(
                "    union {{ uint32_t u[2]; {ctype} v; }} rbits;\n\
                 \x20   rbits.v = ({ctype}){result_expr};\n\
                 \x20   io[{slot}] = rbits.u[0];\n\
                 \x20   io[{slot1}] = rbits.u[1];\n",
                ctype = ctype,
                slot = slot,
                slot1 = slot + 1,
            ));
        }
        other => {
            let ctype = c_type_name(other);
            body.push_str(&format!(
                "    io[{slot}] = (uint32_t)({ctype}){result_expr};\n"
            ));
        }
    }
}

fn generate_wrapper_source(
    signature: &Signature,
    header_filename: &str,
    wrapper_entry: &str,
    slot_count: u32,
    io_base: u32,
) -> String {
    let mut body = String::new();
    let mut current_slot = 0u32;
    let mut call_args = Vec::with_capacity(signature.parameters.len());

    for (idx, param) in signature.parameters.iter().enumerate() {
        let var = unpack_parameter(idx, current_slot, param.category, &param.ty, &mut body);
        current_slot += param.ty.slot_count();
        call_args.push(var);
    }

    let return_slot_count = signature.return_type.slot_count();
    let return_slot = slot_count - return_slot_count;

    let call_expr = format!("{}({})", signature.name, call_args.join(", "));
    if matches!(signature.return_type, CType::Void) {
        body.push_str(&format!("    {call_expr};\n"));
    } else {
        let ret_ctype = c_type_name(&signature.return_type);
        body.push_str(&format!("    {ret_ctype} result = {call_expr};\n"));
        pack_return(&signature.return_type, return_slot, "result", &mut body);
    }

    format!(
        "#include <stdint.h>\n\
         #include \"{header}\"\n\
         \n\
         #define P4JIT_IO_BASE 0x{io_base:08x}u\n\
         #define P4JIT_IO_SLOTS {slot_count}\n\
         \n\
         static volatile uint32_t *const io = (volatile uint32_t *)P4JIT_IO_BASE;\n\
         \n\
         uint32_t {entry}(void) {{\n\
         {body}\
         \x20   return 0;\n\
         }}\n",
        header = header_filename,
        io_base = io_base,
        slot_count = slot_count,
        entry = wrapper_entry,
        body = body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4jit_proto::{CType, ParamCategory, Parameter};

    fn sig_sum_i8() -> Signature {
        Signature {
            name: "sum_i8".to_string(),
            return_type: CType::I32,
            parameters: vec![
                Parameter {
                    name: "a".to_string(),
                    ty: CType::Pointer(Box::new(CType::I8)),
                    category: ParamCategory::Pointer,
                },
                Parameter {
                    name: "n".to_string(),
                    ty: CType::I32,
                    category: ParamCategory::Value,
                },
            ],
        }
    }

    #[test]
    fn wrapper_declares_io_and_calls_target() {
        let src = generate_wrapper_source(&sig_sum_i8(), "sum.h", "call_remote", 32, 0x3001_0000);
        assert!(src.contains("#include \"sum.h\""));
        assert!(src.contains("uint32_t call_remote(void)"));
        assert!(src.contains("int8_t *arg0 = (int8_t *)(uintptr_t)io[0];"));
        assert!(src.contains("int32_t arg1 = (int32_t)io[1];"));
        assert!(src.contains("sum_i8(arg0, arg1)"));
        assert!(src.contains("io[31] = (uint32_t)(int32_t)result;"));
    }

    #[test]
    fn wrapper_handles_64bit_value_and_return() {
        let sig = Signature {
            name: "mul64".to_string(),
            return_type: CType::U64,
            parameters: vec![
                Parameter { name: "a".to_string(), ty: CType::U32, category: ParamCategory::Value },
                Parameter { name: "b".to_string(), ty: CType::U32, category: ParamCategory::Value },
            ],
        };
        let src = generate_wrapper_source(&sig, "mul.h", "call_remote", 32, 0x1000);
        assert!(src.contains("uint64_t v;"));
        assert!(src.contains("io[30] = rbits.u[0];"));
        assert!(src.contains("io[31] = rbits.u[1];"));
    }

    #[test]
    fn header_has_guard_and_prototype() {
        let header = generate_header(&sig_sum_i8(), "sum.h");
        assert!(header.starts_with("#ifndef SUM_H"));
        assert!(header.contains("int32_t sum_i8(int8_t* a, int32_t n);"));
        assert!(header.trim_end().ends_with("#endif // SUM_H"));
    }

    #[test]
    fn header_name_derived_from_source_basename() {
        assert_eq!(header_name_for("biquad.c"), "biquad.h");
        assert_eq!(header_name_for("no_extension"), "no_extension.h");
    }

    #[test]
    fn void_return_skips_result_slot_write() {
        let sig = Signature {
            name: "scale".to_string(),
            return_type: CType::Void,
            parameters: vec![Parameter {
                name: "buf".to_string(),
                ty: CType::Pointer(Box::new(CType::U32)),
                category: ParamCategory::Pointer,
            }],
        };
        let src = generate_wrapper_source(&sig, "scale.h", "call_remote", 32, 0);
        assert!(src.contains("scale(arg0);"));
        assert!(!src.contains("result"));
    }
}
