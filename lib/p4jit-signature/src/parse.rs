//! Turns a synthesized `typedef preamble; return_type name(params);`
//! snippet into a [`Signature`] by walking the AST `lang_c` produces
//! for it. No macro expansion or `#include` handling is needed since
//! the extractor hands this stage an already-clean C fragment.

use lang_c::ast::{
    DeclarationSpecifier, Declarator, DeclaratorKind, DerivedDeclarator, ExternalDeclaration,
    ParameterDeclaration, TypeSpecifier,
};
use lang_c::driver::{parse_preprocessed, Config};
use lang_c::span::Node;

use p4jit_proto::{CType, ParamCategory, Parameter, Signature, TypeMap};

use crate::error::{Result, SignatureError};

pub fn parse_prototype(source: String, type_map: &TypeMap) -> Result<Signature> {
    let config = Config::default();
    let parsed = parse_preprocessed(&config, source)
        .map_err(|e| SignatureError::Unparseable(e.to_string()))?;

    for external in parsed.unit.0 {
        if let ExternalDeclaration::Declaration(decl) = external.node {
            if let Some(sig) = declaration_to_signature(&decl.node, type_map) {
                return Ok(sig);
            }
        }
    }

    Err(SignatureError::Unparseable(
        "no function declarator found in the synthesized prototype".to_string(),
    ))
}

fn declaration_to_signature(
    decl: &lang_c::ast::Declaration,
    type_map: &TypeMap,
) -> Option<Signature> {
    let base_ty = specifiers_to_ctype(&decl.specifiers, type_map)?;
    let init_declarator = decl.declarators.first()?;
    let declarator = &init_declarator.node.declarator.node;

    let name = declarator_name(declarator)?;
    let pointer_depth = pointer_depth_of(declarator);
    let function_params = function_parameters(declarator)?;

    let return_type = wrap_pointer(base_ty, pointer_depth);

    // A single unnamed `void` parameter, e.g. `int f(void)`, means
    // "no parameters" rather than one Void-typed argument.
    let params_is_lone_void = function_params.len() == 1 && {
        let p = &function_params[0].node;
        p.declarator.is_none() && is_bare_void(&p.specifiers)
    };

    let mut parameters = Vec::with_capacity(function_params.len());
    if !params_is_lone_void {
        for (idx, param) in function_params.iter().enumerate() {
            let p = &param.node;
            let param_base = specifiers_to_ctype(&p.specifiers, type_map)?;
            let (param_depth, param_name) = match &p.declarator {
                Some(d) => (
                    pointer_depth_of(&d.node),
                    declarator_name(&d.node).unwrap_or_else(|| format!("arg{idx}")),
                ),
                None => (0, format!("arg{idx}")),
            };
            let ty = wrap_pointer(param_base, param_depth);
            let category = if ty.is_pointer() {
                ParamCategory::Pointer
            } else {
                ParamCategory::Value
            };
            parameters.push(Parameter {
                name: param_name,
                ty,
                category,
            });
        }
    }

    Some(Signature {
        name,
        return_type,
        parameters,
    })
}

/// True if a parameter's specifier list is exactly `void` with no
/// other type keywords layered on (so `void` itself, not e.g. the
/// result of a typedef resolving to `CType::Void`).
fn is_bare_void(specifiers: &[Node<DeclarationSpecifier>]) -> bool {
    specifiers.len() == 1
        && matches!(
            &specifiers[0].node,
            DeclarationSpecifier::TypeSpecifier(ts) if matches!(ts.node, TypeSpecifier::Void)
        )
}

fn function_parameters(declarator: &Declarator) -> Option<&Vec<Node<ParameterDeclaration>>> {
    declarator.derived.iter().find_map(|d| match &d.node {
        DerivedDeclarator::Function(func) => Some(&func.node.parameters),
        _ => None,
    })
}

fn wrap_pointer(base: CType, depth: u32) -> CType {
    let mut ty = base;
    for _ in 0..depth {
        ty = CType::Pointer(Box::new(ty));
    }
    ty
}

/// Counts both `*` and `[]` derived declarators as one pointer level
/// each: an array-declared parameter such as `int8_t buf[16]` decays
/// to a pointer argument just as much as `int8_t *buf` does (spec.md
/// §3/§4.3: category follows "the presence of pointer or array
/// markers").
fn pointer_depth_of(declarator: &Declarator) -> u32 {
    declarator
        .derived
        .iter()
        .filter(|d| {
            matches!(
                d.node,
                DerivedDeclarator::Pointer(_) | DerivedDeclarator::Array(_)
            )
        })
        .count() as u32
}

fn declarator_name(declarator: &Declarator) -> Option<String> {
    match &declarator.kind.node {
        DeclaratorKind::Identifier(id) => Some(id.node.name.clone()),
        DeclaratorKind::Declarator(inner) => declarator_name(&inner.node),
        DeclaratorKind::Abstract => None,
    }
}

/// Folds a specifier list (`unsigned`, `long`, `int`, a typedef name,
/// ...) down to one [`CType`]. Narrower than full C semantics — this
/// loader only ever sees the handful of scalar combinations real
/// firmware code uses.
fn specifiers_to_ctype(
    specifiers: &[Node<DeclarationSpecifier>],
    type_map: &TypeMap,
) -> Option<CType> {
    let mut is_unsigned = false;
    let mut long_count = 0u32;
    let mut short = false;
    let mut base: Option<CType> = None;

    for spec in specifiers {
        if let DeclarationSpecifier::TypeSpecifier(ts) = &spec.node {
            match &ts.node {
                TypeSpecifier::Void => base = Some(CType::Void),
                TypeSpecifier::Char => base = base.or(Some(CType::I8)),
                TypeSpecifier::Short => short = true,
                TypeSpecifier::Int => base = base.or(Some(CType::I32)),
                TypeSpecifier::Long => long_count += 1,
                TypeSpecifier::Float => base = Some(CType::F32),
                TypeSpecifier::Double => base = Some(CType::F64),
                TypeSpecifier::Unsigned => is_unsigned = true,
                TypeSpecifier::Bool => base = Some(CType::U8),
                TypeSpecifier::TypedefName(id) => base = type_map.resolve(&id.node.name),
                _ => {}
            }
        }
    }

    let mut ty = base.unwrap_or(CType::I32);
    if short {
        ty = match ty {
            CType::I32 | CType::U32 => CType::I16,
            other => other,
        };
    }
    if long_count >= 2 {
        ty = match ty {
            CType::I32 => CType::I64,
            CType::U32 => CType::U64,
            other => other,
        };
    }
    if is_unsigned {
        ty = match ty {
            CType::I8 => CType::U8,
            CType::I16 => CType::U16,
            CType::I32 => CType::U32,
            CType::I64 => CType::U64,
            other => other,
        };
    }
    Some(ty)
}
