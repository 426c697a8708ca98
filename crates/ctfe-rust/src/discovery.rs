//! Discovery of marked functions.
//!
//! Candidates are collected syntactically first; each candidate is then
//! turned into an [`AnnotatedFunction`] independently, recording every
//! validation failure instead of stopping at the first one.

use ctfe_core::config::MarkerConfig;
use ctfe_core::model::{
    AnnotatedFunction, Container, Directives, FunctionId, Param, ValidationFailure,
};

use crate::attrs::{has_marker, parse_directives};
use crate::source::{ParsedCrate, ParsedUnit};
use crate::symbols::self_type_name;

/// A marked function together with the syntax needed to describe it.
pub struct Candidate<'a> {
    pub unit: &'a ParsedUnit,
    pub module_path: Vec<String>,
    pub container: Container,
    pub container_attrs: Vec<syn::Attribute>,
    pub attrs: &'a [syn::Attribute],
    pub vis: Option<&'a syn::Visibility>,
    pub sig: &'a syn::Signature,
}

pub fn candidates<'a>(parsed: &'a ParsedCrate, markers: &MarkerConfig) -> Vec<Candidate<'a>> {
    let mut collector = Collector {
        marker: &markers.comptime,
        found: Vec::new(),
    };
    for unit in &parsed.units {
        let mut module_attrs = parsed.declaration_attrs(&unit.unit.module_path);
        module_attrs.extend(unit.file.attrs.iter().cloned());
        collector.items(unit, &unit.file.items, &unit.unit.module_path, &module_attrs, false);
    }
    collector.found
}

struct Collector<'a, 'm> {
    marker: &'m str,
    found: Vec<Candidate<'a>>,
}

impl<'a, 'm> Collector<'a, 'm> {
    fn items(
        &mut self,
        unit: &'a ParsedUnit,
        items: &'a [syn::Item],
        module: &[String],
        module_attrs: &[syn::Attribute],
        nested: bool,
    ) {
        for item in items {
            match item {
                syn::Item::Fn(f) => {
                    let container = if nested { Container::Block } else { Container::Module };
                    self.push(unit, module, container, module_attrs, &f.attrs, Some(&f.vis), &f.sig);
                    self.block(unit, &f.block, module);
                }
                syn::Item::Mod(m) => {
                    if let Some((_, inner)) = &m.content {
                        let mut child = module.to_vec();
                        child.push(m.ident.to_string());
                        self.items(unit, inner, &child, &m.attrs, nested);
                    }
                }
                syn::Item::Impl(imp) => {
                    let container = if nested {
                        Container::Block
                    } else {
                        impl_container(unit, imp)
                    };
                    for impl_item in &imp.items {
                        if let syn::ImplItem::Fn(f) = impl_item {
                            self.push(
                                unit,
                                module,
                                container.clone(),
                                &imp.attrs,
                                &f.attrs,
                                Some(&f.vis),
                                &f.sig,
                            );
                            self.block(unit, &f.block, module);
                        }
                    }
                }
                syn::Item::Trait(t) => {
                    let container = if nested {
                        Container::Block
                    } else {
                        Container::Trait {
                            name: t.ident.to_string(),
                        }
                    };
                    for trait_item in &t.items {
                        if let syn::TraitItem::Fn(f) = trait_item {
                            self.push(unit, module, container.clone(), &t.attrs, &f.attrs, None, &f.sig);
                            if let Some(block) = &f.default {
                                self.block(unit, block, module);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn block(&mut self, unit: &'a ParsedUnit, block: &'a syn::Block, module: &[String]) {
        for stmt in &block.stmts {
            if let syn::Stmt::Item(item) = stmt {
                self.items(unit, std::slice::from_ref(item), module, &[], true);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        unit: &'a ParsedUnit,
        module: &[String],
        container: Container,
        container_attrs: &[syn::Attribute],
        attrs: &'a [syn::Attribute],
        vis: Option<&'a syn::Visibility>,
        sig: &'a syn::Signature,
    ) {
        if !has_marker(attrs, self.marker) {
            return;
        }
        self.found.push(Candidate {
            unit,
            module_path: module.to_vec(),
            container,
            container_attrs: container_attrs.to_vec(),
            attrs,
            vis,
            sig,
        });
    }
}

fn impl_container(unit: &ParsedUnit, imp: &syn::ItemImpl) -> Container {
    let self_ty = unit.text.source_of(imp.self_ty.as_ref());
    match &imp.trait_ {
        Some((_, path, _)) => Container::TraitImpl {
            trait_path: unit.text.source_of(path),
            self_ty,
        },
        None => Container::InherentImpl {
            type_name: self_type_name(&imp.self_ty).unwrap_or_else(|| self_ty.clone()),
            self_ty,
            generics: generics_text(unit, &imp.generics),
            where_clause: where_text(unit, &imp.generics),
        },
    }
}

fn generics_text(unit: &ParsedUnit, generics: &syn::Generics) -> String {
    if generics.params.is_empty() {
        String::new()
    } else {
        unit.text.source_of(generics)
    }
}

fn where_text(unit: &ParsedUnit, generics: &syn::Generics) -> String {
    generics
        .where_clause
        .as_ref()
        .map(|clause| unit.text.source_of(clause))
        .unwrap_or_default()
}

/// Build the description of one candidate, validating it along the way.
pub fn discover(candidate: &Candidate<'_>, markers: &MarkerConfig) -> AnnotatedFunction {
    let Candidate { unit, sig, .. } = candidate;
    let name = sig.ident.to_string();
    let id = FunctionId::new(&candidate.module_path, candidate.container.type_name(), &name);

    let mut failures = Vec::new();
    if !candidate.container.is_extensible() {
        failures.push(ValidationFailure::NotExtensible {
            container: candidate.container.describe(),
        });
    }
    if sig.receiver().is_some() {
        failures.push(ValidationFailure::NotStatic);
    }
    if sig.asyncness.is_some() {
        failures.push(ValidationFailure::Async);
    }

    let mut directives = Directives::default();
    let container_directives = parse_directives(&candidate.container_attrs, markers);
    let own_directives = parse_directives(candidate.attrs, markers);
    for parsed in [container_directives, own_directives] {
        match parsed {
            Ok(found) => directives.extend(found),
            Err(error) => failures.push(ValidationFailure::MalformedDirective {
                attribute: error.attribute,
                message: error.message,
            }),
        }
    }

    let params = sig
        .inputs
        .iter()
        .filter_map(|input| match input {
            syn::FnArg::Typed(typed) => Some(Param {
                pattern: unit.text.source_of(typed.pat.as_ref()),
                ty: unit.text.source_of(typed.ty.as_ref()),
            }),
            syn::FnArg::Receiver(_) => None,
        })
        .collect();

    let return_type = match &sig.output {
        syn::ReturnType::Type(_, ty) => Some(unit.text.source_of(ty.as_ref())),
        syn::ReturnType::Default => None,
    };

    let vis = match candidate.vis {
        Some(syn::Visibility::Inherited) | None => String::new(),
        Some(vis) => unit.text.source_of(vis),
    };

    AnnotatedFunction {
        id,
        name,
        location: unit.text.location(&unit.unit.path, sig.ident.span()),
        module_path: candidate.module_path.clone(),
        container: candidate.container.clone(),
        vis,
        generics: generics_text(unit, &sig.generics),
        where_clause: where_text(unit, &sig.generics),
        params,
        return_type,
        failures,
        directives,
    }
}

/// Discover every marked function of a crate, in source order. Returns
/// `None` when `cancelled` reports true between candidates.
pub fn discover_all(
    parsed: &ParsedCrate,
    markers: &MarkerConfig,
    cancelled: impl Fn() -> bool,
) -> Option<Vec<AnnotatedFunction>> {
    let mut functions = Vec::new();
    for candidate in candidates(parsed, markers) {
        if cancelled() {
            return None;
        }
        let function = discover(&candidate, markers);
        tracing::debug!(
            "Discovered compile-time function {} at {} ({} failure(s))",
            function.id,
            function.location,
            function.failures.len()
        );
        functions.push(function);
    }
    Some(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::host::{Compilation, SourceUnit};
    use pretty_assertions::assert_eq;

    fn discover_text(text: &str) -> Vec<AnnotatedFunction> {
        let compilation = Compilation::new("demo").with_unit(SourceUnit::root("src/lib.rs", text));
        let parsed = ParsedCrate::parse(&compilation).unwrap();
        discover_all(&parsed, &MarkerConfig::default(), || false).unwrap()
    }

    #[test]
    fn describes_module_function() {
        let functions = discover_text(
            r#"
pub mod math {
    #[comptime]
    pub fn factorial(n: u64) -> u64 { (1..=n).product() }
}
"#,
        );
        assert_eq!(functions.len(), 1);
        let f = &functions[0];
        assert_eq!(f.id.as_str(), "math::factorial");
        assert!(f.is_valid());
        assert_eq!(f.vis, "pub");
        assert_eq!(f.params, vec![Param { pattern: "n".into(), ty: "u64".into() }]);
        assert_eq!(f.return_type.as_deref(), Some("u64"));
        assert_eq!((f.location.line, f.location.column), (4, 12));
    }

    #[test]
    fn records_every_failure() {
        let functions = discover_text(
            r#"
struct Counter;
trait Build { fn build() -> u8; }
impl Build for Counter {
    #[comptime]
    fn build() -> u8 { 1 }
}
impl Counter {
    #[comptime]
    async fn read(&self) -> u8 { 1 }
}
fn outer() {
    #[comptime]
    fn inner() -> u8 { 1 }
}
"#,
        );
        assert_eq!(functions.len(), 3);
        assert!(matches!(
            functions[0].failures.as_slice(),
            [ValidationFailure::NotExtensible { .. }]
        ));
        assert_eq!(
            functions[1].failures,
            vec![ValidationFailure::NotStatic, ValidationFailure::Async]
        );
        assert_eq!(functions[1].id.as_str(), "Counter::read");
        assert!(matches!(
            functions[2].failures.as_slice(),
            [ValidationFailure::NotExtensible { container }] if container == "a function body"
        ));
    }

    #[test]
    fn container_directives_come_first() {
        let functions = discover_text(
            r#"
pub struct Tables<T>(T);
#[comptime_uses("std::collections::BTreeMap")]
impl<T: Clone> Tables<T> where T: Default {
    #[comptime]
    #[comptime_uses("crate::data::*")]
    pub fn months() -> Vec<&'static str> { vec![] }
}
"#,
        );
        let f = &functions[0];
        assert_eq!(
            f.directives.uses,
            vec!["std::collections::BTreeMap", "crate::data::*"]
        );
        assert_eq!(
            f.container,
            Container::InherentImpl {
                type_name: "Tables".into(),
                self_ty: "Tables<T>".into(),
                generics: "<T: Clone>".into(),
                where_clause: "where T: Default".into(),
            }
        );
        assert_eq!(f.id.as_str(), "Tables::months");
    }
}
