//! Generated units: cached slots plus redirection entry points.

use std::fmt::Write;

use ctfe_core::host::GeneratedUnit;
use ctfe_core::model::{AnnotatedFunction, CallSite, Container, SerializedLiteral};
use ctfe_core::shape::Shape;
use itertools::Itertools;

/// One evaluated argument group, ready to be written out.
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub args: Vec<String>,
    pub literal: SerializedLiteral,
    pub sites: Vec<CallSite>,
}

pub fn unit_name(function: &AnnotatedFunction) -> String {
    format!("{}.ctfe.rs", function.id.mangled())
}

pub fn slot_name(function: &AnnotatedFunction, index: usize) -> String {
    format!("__CTFE_{}_{}", function.id.constant_stem(), index)
}

pub fn entry_name(function: &AnnotatedFunction, index: usize) -> String {
    format!("{}__ctfe_{}", function.name, index)
}

pub fn synthesize(function: &AnnotatedFunction, shape: &Shape, results: &[GroupResult]) -> GeneratedUnit {
    let mut out = String::new();
    let _ = writeln!(out, "// @generated by ctfe for `{}`. Do not edit.", function.id);

    let slot_ty = shape.rust_type();
    let constant = shape.is_const_constructible();
    for (index, result) in results.iter().enumerate() {
        out.push('\n');
        let call = format!("{}({})", function.name, result.args.join(", "));
        let _ = writeln!(out, "// {}", call.split_whitespace().join(" "));
        let slot = slot_name(function, index);
        if constant {
            let _ = writeln!(out, "const {}: {} = {};", slot, slot_ty, result.literal);
        } else {
            let _ = writeln!(
                out,
                "static {slot}: ::std::sync::LazyLock<{ty}> =\n    ::std::sync::LazyLock::new(|| {literal});",
                slot = slot,
                ty = slot_ty,
                literal = result.literal
            );
        }
    }

    let indent = match &function.container {
        Container::InherentImpl {
            self_ty,
            generics,
            where_clause,
            ..
        } => {
            out.push('\n');
            let _ = write!(out, "impl{} {}", generics, self_ty);
            if !where_clause.is_empty() {
                let _ = write!(out, " {}", where_clause);
            }
            out.push_str(" {\n");
            "    "
        }
        _ => "",
    };

    for (index, result) in results.iter().enumerate() {
        out.push('\n');
        for site in &result.sites {
            if let Some(token) = site.token() {
                let _ = writeln!(out, "{}{}", indent, token.binding);
            }
        }
        let _ = writeln!(out, "{}#[allow(unused_variables, unused_mut, non_snake_case)]", indent);
        let _ = writeln!(out, "{}{}", indent, signature(function, &entry_name(function, index)));
        let slot = slot_name(function, index);
        let body = if constant {
            slot
        } else {
            format!("::std::clone::Clone::clone(&*{})", slot)
        };
        let _ = writeln!(out, "{}    {}", indent, body);
        let _ = writeln!(out, "{}}}", indent);
    }

    if !indent.is_empty() {
        out.push_str("}\n");
    }

    GeneratedUnit {
        name: unit_name(function),
        text: out,
    }
}

fn signature(function: &AnnotatedFunction, name: &str) -> String {
    let mut sig = String::new();
    if !function.vis.is_empty() {
        sig.push_str(&function.vis);
        sig.push(' ');
    }
    let params = function
        .params
        .iter()
        .map(|param| format!("{}: {}", param.pattern, param.ty))
        .join(", ");
    let _ = write!(sig, "fn {}{}({})", name, function.generics, params);
    if let Some(ret) = &function.return_type {
        let _ = write!(sig, " -> {}", ret);
    }
    if !function.where_clause.is_empty() {
        let _ = write!(sig, " {}", function.where_clause);
    }
    sig.push_str(" {");
    sig
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::model::{CallSiteKind, Directives, FunctionId, InterceptToken, Param};
    use ctfe_core::shape::Primitive;
    use ctfe_core::span::Location;
    use pretty_assertions::assert_eq;

    fn function(container: Container, name: &str) -> AnnotatedFunction {
        AnnotatedFunction {
            id: FunctionId::new(&["math".to_string()], container.type_name(), name),
            name: name.to_string(),
            location: Location::new("src/math.rs", 2, 8),
            module_path: vec!["math".to_string()],
            container,
            vis: "pub".to_string(),
            generics: String::new(),
            where_clause: String::new(),
            params: vec![Param {
                pattern: "n".into(),
                ty: "u64".into(),
            }],
            return_type: Some("u64".into()),
            failures: vec![],
            directives: Directives::default(),
        }
    }

    fn result(args: &str, literal: &str, lines: &[u32]) -> GroupResult {
        GroupResult {
            args: vec![args.to_string()],
            literal: SerializedLiteral::new(literal),
            sites: lines
                .iter()
                .map(|line| CallSite {
                    function: FunctionId("math::factorial".into()),
                    location: Location::new("src/main.rs", *line, 13),
                    caller_module: vec![],
                    kind: CallSiteKind::Accepted {
                        args: vec![args.to_string()],
                        token: InterceptToken {
                            id: line.to_string(),
                            binding: format!(
                                "#[ctfe::intercepts(path = \"src/main.rs\", line = {}, column = 13)]",
                                line
                            ),
                        },
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn module_function_gets_const_slots() {
        let f = function(Container::Module, "factorial");
        let unit = synthesize(
            &f,
            &Shape::Primitive(Primitive::U64),
            &[result("5", "120u64", &[3, 7]), result("3", "6u64", &[4])],
        );
        assert_eq!(unit.name, "math__factorial.ctfe.rs");
        assert_eq!(
            unit.text,
            r#"// @generated by ctfe for `math::factorial`. Do not edit.

// factorial(5)
const __CTFE_MATH__FACTORIAL_0: u64 = 120u64;

// factorial(3)
const __CTFE_MATH__FACTORIAL_1: u64 = 6u64;

#[ctfe::intercepts(path = "src/main.rs", line = 3, column = 13)]
#[ctfe::intercepts(path = "src/main.rs", line = 7, column = 13)]
#[allow(unused_variables, unused_mut, non_snake_case)]
pub fn factorial__ctfe_0(n: u64) -> u64 {
    __CTFE_MATH__FACTORIAL_0
}

#[ctfe::intercepts(path = "src/main.rs", line = 4, column = 13)]
#[allow(unused_variables, unused_mut, non_snake_case)]
pub fn factorial__ctfe_1(n: u64) -> u64 {
    __CTFE_MATH__FACTORIAL_1
}
"#
        );
    }

    #[test]
    fn inherent_impl_entry_points_use_lazy_statics() {
        let mut f = function(
            Container::InherentImpl {
                type_name: "Tables".into(),
                self_ty: "Tables<T>".into(),
                generics: "<T>".into(),
                where_clause: String::new(),
            },
            "fib",
        );
        f.return_type = Some("Vec<u64>".into());
        let unit = synthesize(
            &f,
            &Shape::vec(Shape::Primitive(Primitive::U64)),
            &[result("4", "vec![1u64, 1u64, 2u64, 3u64]", &[9])],
        );
        assert!(unit.text.contains(
            "static __CTFE_MATH__TABLES__FIB___5ACA489A_0: ::std::sync::LazyLock<::std::vec::Vec<u64>> =\n    ::std::sync::LazyLock::new(|| vec![1u64, 1u64, 2u64, 3u64]);"
        ));
        assert!(unit.text.contains("impl<T> Tables<T> {\n"));
        assert!(unit
            .text
            .contains("    pub fn fib__ctfe_0(n: u64) -> Vec<u64> {\n        ::std::clone::Clone::clone(&*__CTFE_MATH__TABLES__FIB___5ACA489A_0)\n    }\n}\n"));
    }
}
