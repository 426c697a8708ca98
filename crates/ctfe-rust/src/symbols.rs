//! Name resolution over a parsed crate.
//!
//! The index records what each module declares and imports, just enough to
//! tell whether a path used in a call site names a marked function, a
//! constant or a `static`. Paths are resolved to absolute segment lists;
//! crate-local paths start with `crate`.

use std::collections::HashMap;

use crate::source::ParsedCrate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Module,
    Fn,
    Const,
    Static,
    Type,
    Other,
}

#[derive(Debug, Default, Clone)]
struct ModuleScope {
    items: HashMap<String, SymbolKind>,
    /// Alias to the path as written in the `use` item.
    imports: HashMap<String, Vec<String>>,
    globs: Vec<Vec<String>>,
}

#[derive(Debug, Default, Clone)]
pub struct SymbolIndex {
    modules: HashMap<Vec<String>, ModuleScope>,
    /// Associated items of inherent impls, keyed by `module path + type name`.
    assoc: HashMap<Vec<String>, HashMap<String, SymbolKind>>,
}

const MAX_REDIRECTS: usize = 8;

impl SymbolIndex {
    pub fn build(parsed: &ParsedCrate) -> Self {
        let mut index = SymbolIndex::default();
        for unit in &parsed.units {
            index.collect(&unit.file.items, unit.unit.module_path.clone());
        }
        index
    }

    fn collect(&mut self, items: &[syn::Item], module: Vec<String>) {
        for item in items {
            match item {
                syn::Item::Mod(m) => {
                    self.declare(&module, &m.ident, SymbolKind::Module);
                    if let Some((_, inner)) = &m.content {
                        let mut child = module.clone();
                        child.push(m.ident.to_string());
                        self.collect(inner, child);
                    }
                }
                syn::Item::Fn(f) => self.declare(&module, &f.sig.ident, SymbolKind::Fn),
                syn::Item::Const(c) => self.declare(&module, &c.ident, SymbolKind::Const),
                syn::Item::Static(s) => self.declare(&module, &s.ident, SymbolKind::Static),
                syn::Item::Struct(s) => self.declare(&module, &s.ident, SymbolKind::Type),
                syn::Item::Enum(e) => self.declare(&module, &e.ident, SymbolKind::Type),
                syn::Item::Union(u) => self.declare(&module, &u.ident, SymbolKind::Type),
                syn::Item::Type(t) => self.declare(&module, &t.ident, SymbolKind::Type),
                syn::Item::Trait(t) => self.declare(&module, &t.ident, SymbolKind::Type),
                syn::Item::Macro(m) => {
                    if let Some(ident) = &m.ident {
                        self.declare(&module, ident, SymbolKind::Other);
                    }
                }
                syn::Item::Use(u) => {
                    let scope = self.modules.entry(module.clone()).or_default();
                    flatten_use(&u.tree, Vec::new(), scope);
                }
                syn::Item::Impl(imp) if imp.trait_.is_none() => {
                    let Some(type_name) = self_type_name(&imp.self_ty) else {
                        continue;
                    };
                    let mut key = module.clone();
                    key.push(type_name);
                    let entry = self.assoc.entry(key).or_default();
                    for impl_item in &imp.items {
                        match impl_item {
                            syn::ImplItem::Fn(f) => {
                                entry.insert(f.sig.ident.to_string(), SymbolKind::Fn);
                            }
                            syn::ImplItem::Const(c) => {
                                entry.insert(c.ident.to_string(), SymbolKind::Const);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        self.modules.entry(module).or_default();
    }

    fn declare(&mut self, module: &[String], ident: &syn::Ident, kind: SymbolKind) {
        self.modules
            .entry(module.to_vec())
            .or_default()
            .items
            .insert(ident.to_string(), kind);
    }

    fn scope(&self, module: &[String]) -> Option<&ModuleScope> {
        self.modules.get(module)
    }

    /// Resolve a path written in `module` (inside an impl of `self_ty`, if
    /// any) to absolute segments.
    pub fn resolve(&self, module: &[String], self_ty: Option<&[String]>, segments: &[String]) -> Vec<String> {
        let resolved = self.absolutize(module, self_ty, segments);
        self.follow_reexports(resolved)
    }

    pub fn resolve_path(&self, module: &[String], self_ty: Option<&[String]>, path: &syn::Path) -> Vec<String> {
        let segments = path_segments(path);
        if path.leading_colon.is_some() {
            return segments;
        }
        self.resolve(module, self_ty, &segments)
    }

    fn absolutize(&self, module: &[String], self_ty: Option<&[String]>, segments: &[String]) -> Vec<String> {
        let Some((first, rest)) = segments.split_first() else {
            return Vec::new();
        };
        let mut base: Vec<String> = match first.as_str() {
            "crate" => vec!["crate".to_string()],
            "self" => crate_prefixed(module),
            "super" => {
                let mut base = crate_prefixed(module);
                base.pop();
                let mut rest = rest;
                while let Some(("super", tail)) = rest.split_first().map(|(h, t)| (h.as_str(), t)) {
                    if base.len() > 1 {
                        base.pop();
                    }
                    rest = tail;
                }
                base.extend(rest.iter().cloned());
                return base;
            }
            "Self" => match self_ty {
                Some(ty) => ty.to_vec(),
                None => return segments.to_vec(),
            },
            name => {
                let scope = self.scope(module);
                if scope.is_some_and(|s| s.items.contains_key(name)) {
                    let mut base = crate_prefixed(module);
                    base.push(name.to_string());
                    base
                } else if let Some(target) = scope.and_then(|s| s.imports.get(name)) {
                    self.absolutize(module, self_ty, target)
                } else if let Some(base) = self.glob_lookup(module, name) {
                    base
                } else {
                    return segments.to_vec();
                }
            }
        };
        base.extend(rest.iter().cloned());
        base
    }

    fn glob_lookup(&self, module: &[String], name: &str) -> Option<Vec<String>> {
        let scope = self.scope(module)?;
        for glob in &scope.globs {
            let target = self.absolutize(module, None, glob);
            let Some(local) = target.strip_prefix(&["crate".to_string()]) else {
                continue;
            };
            if self.scope(local).is_some_and(|s| s.items.contains_key(name)) {
                let mut path = target.clone();
                path.push(name.to_string());
                return Some(path);
            }
        }
        None
    }

    fn follow_reexports(&self, mut path: Vec<String>) -> Vec<String> {
        for _ in 0..MAX_REDIRECTS {
            let Some((name, parent)) = path.split_last() else {
                break;
            };
            let Some(module) = parent.strip_prefix(&["crate".to_string()]) else {
                break;
            };
            let Some(scope) = self.scope(module) else {
                break;
            };
            if scope.items.contains_key(name) {
                break;
            }
            let Some(target) = scope.imports.get(name) else {
                break;
            };
            path = self.absolutize(module, None, target);
        }
        path
    }

    /// Kind of the item an absolute path names, if it is crate-local.
    pub fn kind_of(&self, resolved: &[String]) -> Option<SymbolKind> {
        let local = resolved.strip_prefix(&["crate".to_string()])?;
        let (name, parent) = local.split_last()?;
        if let Some(kind) = self.scope(parent).and_then(|s| s.items.get(name)) {
            return Some(*kind);
        }
        self.assoc.get(parent).and_then(|items| items.get(name)).copied()
    }

    pub fn is_static(&self, resolved: &[String]) -> bool {
        self.kind_of(resolved) == Some(SymbolKind::Static)
    }
}

fn crate_prefixed(module: &[String]) -> Vec<String> {
    let mut path = vec!["crate".to_string()];
    path.extend(module.iter().cloned());
    path
}

pub fn path_segments(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|s| s.ident.to_string()).collect()
}

/// Last path segment of an impl's self type.
pub fn self_type_name(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(p) if p.qself.is_none() => {
            p.path.segments.last().map(|s| s.ident.to_string())
        }
        syn::Type::Paren(p) => self_type_name(&p.elem),
        syn::Type::Group(g) => self_type_name(&g.elem),
        _ => None,
    }
}

fn flatten_use(tree: &syn::UseTree, prefix: Vec<String>, scope: &mut ModuleScope) {
    match tree {
        syn::UseTree::Path(p) => {
            let mut next = prefix;
            next.push(p.ident.to_string());
            flatten_use(&p.tree, next, scope);
        }
        syn::UseTree::Name(n) => {
            let name = n.ident.to_string();
            if name == "self" {
                if let Some(last) = prefix.last().cloned() {
                    scope.imports.insert(last, prefix);
                }
                return;
            }
            let mut path = prefix;
            path.push(name.clone());
            scope.imports.insert(name, path);
        }
        syn::UseTree::Rename(r) => {
            let mut path = prefix;
            if r.ident != "self" {
                path.push(r.ident.to_string());
            }
            scope.imports.insert(r.rename.to_string(), path);
        }
        syn::UseTree::Glob(_) => scope.globs.push(prefix),
        syn::UseTree::Group(g) => {
            for item in &g.items {
                flatten_use(item, prefix.clone(), scope);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::host::{Compilation, SourceUnit};

    fn index(text: &str) -> SymbolIndex {
        let compilation = Compilation::new("demo").with_unit(SourceUnit::root("src/lib.rs", text));
        SymbolIndex::build(&ParsedCrate::parse(&compilation).unwrap())
    }

    fn strings(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_imports_and_globs() {
        let index = index(
            r#"
            mod math {
                pub const LIMIT: u32 = 10;
                pub static COUNTER: u32 = 0;
                pub fn factorial(n: u64) -> u64 { n }
            }
            mod app {
                use crate::math::factorial as fact;
                use super::math::*;
                fn run() {}
            }
            "#,
        );
        let app = strings(&["app"]);
        assert_eq!(
            index.resolve(&app, None, &strings(&["fact"])),
            strings(&["crate", "math", "factorial"])
        );
        let counter = index.resolve(&app, None, &strings(&["COUNTER"]));
        assert!(index.is_static(&counter));
        let limit = index.resolve(&app, None, &strings(&["LIMIT"]));
        assert_eq!(index.kind_of(&limit), Some(SymbolKind::Const));
        assert_eq!(
            index.resolve(&app, None, &strings(&["i32", "MAX"])),
            strings(&["i32", "MAX"])
        );
    }

    #[test]
    fn resolves_self_type_and_reexports() {
        let index = index(
            r#"
            pub use tables::Tables;
            mod tables {
                pub struct Tables;
                impl Tables {
                    pub fn fib(n: usize) -> Vec<u64> { vec![] }
                }
            }
            "#,
        );
        let self_ty = strings(&["crate", "tables", "Tables"]);
        let fib = index.resolve(&strings(&["tables"]), Some(&self_ty), &strings(&["Self", "fib"]));
        assert_eq!(fib, strings(&["crate", "tables", "Tables", "fib"]));
        assert_eq!(index.kind_of(&fib), Some(SymbolKind::Fn));

        let via_root = index.resolve(&[], None, &strings(&["Tables", "fib"]));
        assert_eq!(via_root, fib);
    }
}
