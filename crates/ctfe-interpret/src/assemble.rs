//! Folding a multi-file compilation into one library source.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use ctfe_core::config::MarkerConfig;
use ctfe_core::host::{Compilation, SourceUnit};
use ctfe_core::model::AnnotatedFunction;
use ctfe_rust::attrs::matches_marker;
use ctfe_rust::symbols::self_type_name;
use proc_macro2::Span;
use quote::ToTokens;
use syn::visit_mut::{self, VisitMut};

use crate::error::{EvalError, Result};

/// Crate name of the assembled image.
pub const IMAGE_CRATE: &str = "ctfe_image";

#[derive(Debug, Clone)]
pub struct AssembledImage {
    pub source: String,
    file: syn::File,
    /// `use` items of every module, rebased onto the image crate.
    module_uses: HashMap<Vec<String>, Vec<String>>,
}

impl AssembledImage {
    pub fn uses_of(&self, module: &[String]) -> &[String] {
        self.module_uses
            .get(module)
            .map(|uses| uses.as_slice())
            .unwrap_or_default()
    }

    /// Call path of `function` inside the image, checked against the
    /// assembled items.
    pub fn locate(&self, function: &AnnotatedFunction) -> Result<Vec<String>> {
        let items = module_items(&self.file.items, &function.module_path).ok_or_else(|| {
            EvalError::Load(format!(
                "module of `{}` is missing from the crate image",
                function.id
            ))
        })?;

        let mut candidates: Vec<&syn::Signature> = Vec::new();
        match function.container.type_name() {
            Some(type_name) => {
                for item in items {
                    let syn::Item::Impl(imp) = item else { continue };
                    if imp.trait_.is_some()
                        || self_type_name(&imp.self_ty).as_deref() != Some(type_name)
                    {
                        continue;
                    }
                    for impl_item in &imp.items {
                        if let syn::ImplItem::Fn(f) = impl_item {
                            if f.sig.ident == function.name {
                                candidates.push(&f.sig);
                            }
                        }
                    }
                }
            }
            None => {
                for item in items {
                    if let syn::Item::Fn(f) = item {
                        if f.sig.ident == function.name {
                            candidates.push(&f.sig);
                        }
                    }
                }
            }
        }

        let wanted: Vec<String> = function.params.iter().map(|p| compact(&p.ty)).collect();
        let exact = candidates.iter().find(|sig| param_types(sig) == wanted);
        let found = exact.or_else(|| {
            tracing::debug!("No exact signature match for `{}`, matching by arity", function.id);
            candidates
                .iter()
                .find(|sig| sig.inputs.len() == function.arity())
        });
        if found.is_none() {
            return Err(EvalError::Load(format!(
                "`{}` taking {} parameter(s) was not found in the crate image",
                function.id,
                function.arity()
            )));
        }

        let mut path = vec![IMAGE_CRATE.to_string()];
        path.extend(function.call_path());
        Ok(path)
    }
}

/// Assemble `compilation` plus `extra` units into a single library source.
///
/// Units whose module is declared with `mod name;` are inlined at the
/// declaration; the rest become `pub mod` items under their parent module.
pub fn assemble(
    compilation: &Compilation,
    extra: &[SourceUnit],
    markers: &MarkerConfig,
) -> Result<AssembledImage> {
    let mut files: BTreeMap<Vec<String>, syn::File> = BTreeMap::new();
    for unit in compilation.units.iter().chain(extra) {
        let text = unit.text.strip_prefix('\u{feff}').unwrap_or(&unit.text);
        let mut file = syn::parse_file(text).map_err(|e| {
            EvalError::emit(format!("{}: {}", unit.path.display(), e))
        })?;
        let dir = unit_dir(compilation.base_dir.as_deref(), &unit.path);
        IncludeRebaser { dir: &dir }.visit_file_mut(&mut file);
        files.insert(unit.module_path.clone(), file);
    }

    let mut root = files.remove(&Vec::new()).ok_or_else(|| {
        EvalError::emit(format!("crate `{}` has no root file", compilation.crate_name))
    })?;
    inline_modules(&mut root.items, &[], &mut files);
    for (path, file) in std::mem::take(&mut files) {
        attach(&mut root.items, &path, file.attrs, file.items)?;
    }

    MarkerStripper { markers }.visit_file_mut(&mut root);
    let mut module_uses = HashMap::new();
    collect_uses(&root.items, &[], &mut module_uses);
    widen(&mut root.items);

    Ok(AssembledImage {
        source: root.to_token_stream().to_string(),
        file: root,
        module_uses,
    })
}

fn unit_dir(base_dir: Option<&Path>, unit_path: &Path) -> PathBuf {
    let path = match base_dir {
        Some(base) if unit_path.is_relative() => base.join(unit_path),
        _ => unit_path.to_path_buf(),
    };
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn inline_modules(
    items: &mut [syn::Item],
    module: &[String],
    files: &mut BTreeMap<Vec<String>, syn::File>,
) {
    for item in items {
        let syn::Item::Mod(m) = item else { continue };
        let mut path = module.to_vec();
        path.push(m.ident.to_string());
        if m.content.is_none() {
            if let Some(file) = files.remove(&path) {
                m.attrs.retain(|attr| !attr.path().is_ident("path"));
                m.attrs.extend(file.attrs);
                m.content = Some((syn::token::Brace::default(), file.items));
                m.semi = None;
            }
        }
        if let Some((_, content)) = &mut m.content {
            inline_modules(content, &path, files);
        }
    }
}

fn attach(
    items: &mut Vec<syn::Item>,
    path: &[String],
    attrs: Vec<syn::Attribute>,
    content: Vec<syn::Item>,
) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        items.extend(content);
        return Ok(());
    };
    let position = items
        .iter()
        .position(|item| matches!(item, syn::Item::Mod(m) if m.ident == first));
    let index = match position {
        Some(index) => index,
        None => {
            let ident: syn::Ident = syn::parse_str(first)
                .map_err(|_| EvalError::emit(format!("`{}` is not a valid module name", first)))?;
            items.push(syn::parse_quote!(pub mod #ident {}));
            items.len() - 1
        }
    };
    let syn::Item::Mod(module) = &mut items[index] else {
        return Ok(());
    };
    let mut attrs = attrs;
    if rest.is_empty() {
        module.attrs.append(&mut attrs);
    }
    module.semi = None;
    let (_, children) = module
        .content
        .get_or_insert_with(|| (syn::token::Brace::default(), Vec::new()));
    attach(children, rest, attrs, content)
}

fn module_items<'a>(items: &'a [syn::Item], path: &[String]) -> Option<&'a [syn::Item]> {
    let Some((first, rest)) = path.split_first() else {
        return Some(items);
    };
    items.iter().find_map(|item| match item {
        syn::Item::Mod(m) if m.ident == first => m
            .content
            .as_ref()
            .and_then(|(_, content)| module_items(content, rest)),
        _ => None,
    })
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn param_types(sig: &syn::Signature) -> Vec<String> {
    sig.inputs
        .iter()
        .map(|arg| match arg {
            syn::FnArg::Typed(pat) => compact(&pat.ty.to_token_stream().to_string()),
            syn::FnArg::Receiver(_) => "self".to_string(),
        })
        .collect()
}

pub(crate) fn ident(name: &str) -> syn::Ident {
    match name.strip_prefix("r#") {
        Some(raw) => syn::Ident::new_raw(raw, Span::call_site()),
        None => syn::Ident::new(name, Span::call_site()),
    }
}

fn image_path(module: &[String]) -> Vec<String> {
    let mut path = vec![IMAGE_CRATE.to_string()];
    path.extend(module.iter().cloned());
    path
}

fn local_names(items: &[syn::Item]) -> HashSet<String> {
    items
        .iter()
        .filter_map(|item| match item {
            syn::Item::Fn(f) => Some(&f.sig.ident),
            syn::Item::Const(c) => Some(&c.ident),
            syn::Item::Static(s) => Some(&s.ident),
            syn::Item::Struct(s) => Some(&s.ident),
            syn::Item::Enum(e) => Some(&e.ident),
            syn::Item::Union(u) => Some(&u.ident),
            syn::Item::Type(t) => Some(&t.ident),
            syn::Item::Trait(t) => Some(&t.ident),
            syn::Item::Mod(m) => Some(&m.ident),
            _ => None,
        })
        .map(|ident| ident.to_string())
        .collect()
}

fn collect_uses(
    items: &[syn::Item],
    module: &[String],
    out: &mut HashMap<Vec<String>, Vec<String>>,
) {
    let locals = local_names(items);
    let uses = items
        .iter()
        .filter_map(|item| match item {
            syn::Item::Use(u) => Some(rebase_use(u, module, &locals)),
            _ => None,
        })
        .collect();
    out.insert(module.to_vec(), uses);
    for item in items {
        if let syn::Item::Mod(m) = item {
            if let Some((_, content)) = &m.content {
                let mut path = module.to_vec();
                path.push(m.ident.to_string());
                collect_uses(content, &path, out);
            }
        }
    }
}

/// A `use` item as it must be written outside the image crate.
pub fn rebase_use(item: &syn::ItemUse, module: &[String], locals: &HashSet<String>) -> String {
    let mut item = item.clone();
    item.vis = syn::Visibility::Inherited;
    if item.leading_colon.is_none() {
        item.tree = rebase_tree(&item.tree, module, locals);
    }
    item.to_token_stream().to_string()
}

pub(crate) fn rebase_tree(
    tree: &syn::UseTree,
    module: &[String],
    locals: &HashSet<String>,
) -> syn::UseTree {
    let (base, rest) = match tree {
        syn::UseTree::Path(p) if p.ident == "crate" => (image_path(&[]), &*p.tree),
        syn::UseTree::Path(p) if p.ident == "self" => (image_path(module), &*p.tree),
        syn::UseTree::Path(p) if p.ident == "super" => {
            let mut parent = module.to_vec();
            parent.pop();
            let mut next = &*p.tree;
            while let syn::UseTree::Path(q) = next {
                if q.ident != "super" {
                    break;
                }
                parent.pop();
                next = &q.tree;
            }
            (image_path(&parent), next)
        }
        syn::UseTree::Path(syn::UsePath { ident, .. })
        | syn::UseTree::Name(syn::UseName { ident })
        | syn::UseTree::Rename(syn::UseRename { ident, .. })
            if locals.contains(&ident.to_string()) =>
        {
            (image_path(module), tree)
        }
        _ => return tree.clone(),
    };
    base.iter().rev().fold(rest.clone(), |tree, segment| {
        syn::UseTree::Path(syn::UsePath {
            ident: ident(segment),
            colon2_token: Default::default(),
            tree: Box::new(tree),
        })
    })
}

fn widen(items: &mut [syn::Item]) {
    let public = || syn::Visibility::Public(Default::default());
    for item in items {
        match item {
            syn::Item::Fn(f) => f.vis = public(),
            syn::Item::Const(c) => c.vis = public(),
            syn::Item::Static(s) => s.vis = public(),
            syn::Item::Struct(s) => s.vis = public(),
            syn::Item::Enum(e) => e.vis = public(),
            syn::Item::Union(u) => u.vis = public(),
            syn::Item::Type(t) => t.vis = public(),
            syn::Item::Trait(t) => t.vis = public(),
            syn::Item::Mod(m) => {
                m.vis = public();
                if let Some((_, content)) = &mut m.content {
                    widen(content);
                }
            }
            syn::Item::Impl(imp) if imp.trait_.is_none() => {
                for impl_item in &mut imp.items {
                    match impl_item {
                        syn::ImplItem::Fn(f) => f.vis = public(),
                        syn::ImplItem::Const(c) => c.vis = public(),
                        syn::ImplItem::Type(t) => t.vis = public(),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

/// Removes marker and directive attributes, which have no meaning inside
/// the image and may not resolve there.
struct MarkerStripper<'a> {
    markers: &'a MarkerConfig,
}

impl MarkerStripper<'_> {
    fn strip(&self, attrs: &mut Vec<syn::Attribute>) {
        let markers = [
            &self.markers.comptime,
            &self.markers.files,
            &self.markers.uses,
            &self.markers.plugins,
        ];
        attrs.retain(|attr| !markers.iter().any(|marker| matches_marker(attr, marker)));
    }
}

impl VisitMut for MarkerStripper<'_> {
    fn visit_file_mut(&mut self, file: &mut syn::File) {
        self.strip(&mut file.attrs);
        visit_mut::visit_file_mut(self, file);
    }

    fn visit_item_mut(&mut self, item: &mut syn::Item) {
        match item {
            syn::Item::Fn(f) => self.strip(&mut f.attrs),
            syn::Item::Impl(i) => self.strip(&mut i.attrs),
            syn::Item::Mod(m) => self.strip(&mut m.attrs),
            syn::Item::Trait(t) => self.strip(&mut t.attrs),
            _ => {}
        }
        visit_mut::visit_item_mut(self, item);
    }

    fn visit_impl_item_fn_mut(&mut self, f: &mut syn::ImplItemFn) {
        self.strip(&mut f.attrs);
        visit_mut::visit_impl_item_fn_mut(self, f);
    }

    fn visit_trait_item_fn_mut(&mut self, f: &mut syn::TraitItemFn) {
        self.strip(&mut f.attrs);
        visit_mut::visit_trait_item_fn_mut(self, f);
    }
}

/// Makes relative `include*!` paths absolute, since the image is compiled
/// away from the original source tree.
struct IncludeRebaser<'a> {
    dir: &'a Path,
}

impl VisitMut for IncludeRebaser<'_> {
    fn visit_macro_mut(&mut self, mac: &mut syn::Macro) {
        let is_include = ["include", "include_str", "include_bytes"]
            .iter()
            .any(|name| mac.path.is_ident(name));
        if is_include && !self.dir.as_os_str().is_empty() {
            if let Ok(lit) = syn::parse2::<syn::LitStr>(mac.tokens.clone()) {
                let target = PathBuf::from(lit.value());
                if target.is_relative() {
                    let absolute = self.dir.join(target);
                    let lit = syn::LitStr::new(&absolute.to_string_lossy(), lit.span());
                    mac.tokens = lit.to_token_stream();
                }
            }
        }
        visit_mut::visit_macro_mut(self, mac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::model::{Container, Directives, FunctionId, Param};
    use ctfe_core::span::Location;
    use pretty_assertions::assert_eq;

    fn compilation() -> Compilation {
        Compilation::new("demo")
            .with_unit(SourceUnit::root(
                "src/main.rs",
                r#"
                mod math;
                use math::Tables;
                fn main() {}
                "#,
            ))
            .with_unit(SourceUnit::new(
                "src/math.rs",
                vec!["math".to_string()],
                r#"
                //! Math helpers.
                use super::*;
                use self::inner::Helper;
                const BASE: u64 = 1;
                struct Tables;
                impl Tables {
                    #[comptime]
                    fn fib(n: usize) -> Vec<u64> { vec![BASE; n] }
                }
                #[comptime]
                #[comptime_uses("std::fmt")]
                fn double(n: u64) -> u64 { n * 2 }
                mod inner { pub struct Helper; }
                "#,
            ))
    }

    fn function(container: Container, name: &str, params: &[(&str, &str)]) -> AnnotatedFunction {
        let module_path = vec!["math".to_string()];
        AnnotatedFunction {
            id: FunctionId::new(&module_path, container.type_name(), name),
            name: name.to_string(),
            location: Location::new("src/math.rs", 1, 1),
            module_path,
            container,
            vis: String::new(),
            generics: String::new(),
            where_clause: String::new(),
            params: params
                .iter()
                .map(|(pattern, ty)| Param {
                    pattern: pattern.to_string(),
                    ty: ty.to_string(),
                })
                .collect(),
            return_type: Some("u64".to_string()),
            failures: vec![],
            directives: Directives::default(),
        }
    }

    #[test]
    fn inlines_file_modules_and_widens_items() -> eyre::Result<()> {
        let image = assemble(&compilation(), &[], &MarkerConfig::default())?;
        let file: syn::File = syn::parse_str(&image.source)?;
        let text = file.to_token_stream().to_string();
        assert!(text.contains("pub mod math"));
        assert!(text.contains("pub const BASE : u64 = 1"));
        assert!(text.contains("pub fn fib"));
        assert!(text.contains("pub fn double"));
        assert!(!text.contains("comptime"));
        assert!(text.contains("# ! [doc = \" Math helpers.\"]"));
        Ok(())
    }

    #[test]
    fn rebases_module_uses() -> eyre::Result<()> {
        let image = assemble(&compilation(), &[], &MarkerConfig::default())?;
        assert_eq!(
            image.uses_of(&["math".to_string()]),
            &[
                "use ctfe_image :: * ;".to_string(),
                "use ctfe_image :: math :: inner :: Helper ;".to_string(),
            ]
        );
        assert_eq!(image.uses_of(&[]), &["use ctfe_image :: math :: Tables ;".to_string()]);
        Ok(())
    }

    #[test]
    fn locates_functions_by_container_and_arity() -> eyre::Result<()> {
        let image = assemble(&compilation(), &[], &MarkerConfig::default())?;
        let fib = function(
            Container::InherentImpl {
                type_name: "Tables".to_string(),
                self_ty: "Tables".to_string(),
                generics: String::new(),
                where_clause: String::new(),
            },
            "fib",
            &[("n", "usize")],
        );
        assert_eq!(image.locate(&fib)?, vec!["ctfe_image", "math", "Tables", "fib"]);

        let renamed = function(Container::Module, "double", &[("n", "Number")]);
        assert_eq!(image.locate(&renamed)?, vec!["ctfe_image", "math", "double"]);

        let missing = function(Container::Module, "double", &[]);
        assert!(matches!(image.locate(&missing), Err(EvalError::Load(_))));
        Ok(())
    }

    #[test]
    fn extra_units_become_modules() -> eyre::Result<()> {
        let extra = SourceUnit::new(
            "gen/tables.rs",
            vec!["generated".to_string()],
            "pub const SIZE: usize = 4;",
        );
        let image = assemble(&compilation(), &[extra], &MarkerConfig::default())?;
        assert!(image.source.contains("pub mod generated { pub const SIZE : usize = 4 ; }"));
        Ok(())
    }

    #[test]
    fn include_paths_become_absolute() -> eyre::Result<()> {
        let compilation = Compilation::new("demo")
            .with_base_dir("/work/demo")
            .with_unit(SourceUnit::root(
                "src/lib.rs",
                r#"pub fn data() -> &'static str { include_str!("data.txt") }"#,
            ));
        let image = assemble(&compilation, &[], &MarkerConfig::default())?;
        assert!(image.source.contains(r#"include_str ! ("/work/demo/src/data.txt")"#));
        Ok(())
    }
}
