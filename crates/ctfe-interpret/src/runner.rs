//! Runner programs that invoke a compile-time function inside the image.

use std::collections::HashSet;
use std::fmt::Write;

use ctfe_core::shape::Shape;
use quote::ToTokens;
use syn::visit_mut::{self, VisitMut};

use crate::assemble::{ident, rebase_tree, IMAGE_CRATE};
use crate::wire::SUPPORT_SOURCE;

pub struct RunnerSpec<'a> {
    /// Call path of the target, starting with the image crate.
    pub target: &'a [String],
    pub shape: &'a Shape,
    pub args: &'a [String],
    pub caller_module: &'a [String],
    /// The caller module's `use` items, already rebased.
    pub caller_uses: &'a [String],
    /// Extra `use` paths requested by directives.
    pub extra_uses: &'a [String],
    /// Module the directives were written in.
    pub function_module: &'a [String],
}

pub fn runner_source(spec: &RunnerSpec<'_>) -> String {
    let mut out = String::new();
    out.push_str("#![allow(unused_imports, unused_parens, dead_code)]\n");
    out.push_str(SUPPORT_SOURCE);
    out.push('\n');

    let target = spec.target.join("::");
    let ty = spec.shape.rust_type();
    if spec.args.is_empty() {
        let _ = write!(
            out,
            "fn main() {{\n    let value: {} = {}();\n    __ctfe_wire::emit(&value);\n}}\n",
            ty, target
        );
        return out;
    }

    let mut glob = vec![IMAGE_CRATE.to_string()];
    glob.extend(spec.caller_module.iter().cloned());
    let _ = writeln!(out, "use {}::*;", glob.join("::"));
    let mut seen = Vec::new();
    for item in spec.caller_uses {
        if !seen.contains(item) {
            let _ = writeln!(out, "{}", item);
            seen.push(item.clone());
        }
    }
    for path in spec.extra_uses {
        let item = match syn::parse_str::<syn::UseTree>(path) {
            Ok(tree) => format!(
                "use {};",
                rebase_tree(&tree, spec.function_module, &HashSet::new()).to_token_stream()
            ),
            Err(_) => format!("use {};", path),
        };
        if !seen.contains(&item) {
            let _ = writeln!(out, "{}", item);
            seen.push(item);
        }
    }

    let args: Vec<String> = spec
        .args
        .iter()
        .map(|arg| rebase_text(arg, spec.caller_module))
        .collect();
    let _ = write!(
        out,
        "\nfn __ctfe_wrapper() -> {ty} {{\n    {target}({args})\n}}\n\nfn main() {{\n    let value = __ctfe_wrapper();\n    __ctfe_wire::emit(&value);\n}}\n",
        ty = ty,
        target = target,
        args = args.join(", ")
    );
    out
}

/// Rewrite `crate`, `self` and `super` roots onto the image crate. Text
/// that does not parse, or needs no change, is returned verbatim.
fn rebase_text(text: &str, module: &[String]) -> String {
    if let Ok(mut expr) = syn::parse_str::<syn::Expr>(text) {
        let mut rebaser = PathRebaser {
            module,
            changed: false,
        };
        rebaser.visit_expr_mut(&mut expr);
        return if rebaser.changed {
            expr.to_token_stream().to_string()
        } else {
            text.to_string()
        };
    }
    if let Ok(mut path) = syn::parse_str::<syn::Path>(text) {
        let mut rebaser = PathRebaser {
            module,
            changed: false,
        };
        rebaser.visit_path_mut(&mut path);
        if rebaser.changed {
            return path.to_token_stream().to_string();
        }
    }
    text.to_string()
}

struct PathRebaser<'a> {
    module: &'a [String],
    changed: bool,
}

impl VisitMut for PathRebaser<'_> {
    fn visit_path_mut(&mut self, path: &mut syn::Path) {
        visit_mut::visit_path_mut(self, path);
        if path.leading_colon.is_some() {
            return;
        }
        let Some(first) = path.segments.first() else {
            return;
        };
        let (mut base, skip) = if first.ident == "crate" {
            (Vec::new(), 1)
        } else if first.ident == "self" && path.segments.len() > 1 {
            (self.module.to_vec(), 1)
        } else if first.ident == "super" {
            let mut parent = self.module.to_vec();
            let supers = path
                .segments
                .iter()
                .take_while(|segment| segment.ident == "super")
                .count();
            for _ in 0..supers {
                parent.pop();
            }
            (parent, supers)
        } else {
            return;
        };
        base.insert(0, IMAGE_CRATE.to_string());

        let mut segments: syn::punctuated::Punctuated<syn::PathSegment, syn::Token![::]> =
            base.iter()
                .map(|name| syn::PathSegment::from(ident(name)))
                .collect();
        segments.extend(path.segments.iter().skip(skip).cloned());
        path.segments = segments;
        self.changed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::shape::Primitive;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn zero_argument_runner_calls_directly() {
        let target = strings(&["ctfe_image", "answer"]);
        let source = runner_source(&RunnerSpec {
            target: &target,
            shape: &Shape::Primitive(Primitive::I32),
            args: &[],
            caller_module: &[],
            caller_uses: &[],
            extra_uses: &[],
            function_module: &[],
        });
        assert!(source.ends_with(
            "fn main() {\n    let value: i32 = ctfe_image::answer();\n    __ctfe_wire::emit(&value);\n}\n"
        ));
        assert!(source.contains("mod __ctfe_wire"));
    }

    #[test]
    fn wrapper_imports_the_caller_scope() {
        let target = strings(&["ctfe_image", "math", "factorial"]);
        let module = strings(&["app"]);
        let caller_uses = strings(&["use ctfe_image :: math ;", "use ctfe_image :: math ;"]);
        let extra_uses = strings(&["crate::consts::*"]);
        let args = strings(&["math::BASE + 2", "super::LIMIT", "LIMIT as u64"]);
        let source = runner_source(&RunnerSpec {
            target: &target,
            shape: &Shape::vec(Shape::Primitive(Primitive::U64)),
            args: &args,
            caller_module: &module,
            caller_uses: &caller_uses,
            extra_uses: &extra_uses,
            function_module: &strings(&["math"]),
        });
        let expected = r#"use ctfe_image::app::*;
use ctfe_image :: math ;
use ctfe_image :: consts :: *;

fn __ctfe_wrapper() -> ::std::vec::Vec<u64> {
    ctfe_image::math::factorial(math::BASE + 2, ctfe_image :: LIMIT, LIMIT as u64)
}
"#;
        assert!(source.contains(expected), "{}", source);
    }

    #[test]
    fn verbatim_text_is_kept_when_nothing_changes() {
        assert_eq!(rebase_text("1  +   2", &[]), "1  +   2");
        assert_eq!(rebase_text("self::X", &strings(&["a", "b"])), "ctfe_image :: a :: b :: X");
    }
}
