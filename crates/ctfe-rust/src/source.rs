//! Crate sources: loading a crate from disk and mapping spans back to text.

use std::path::{Path, PathBuf};

use ctfe_core::error::{Error, Result};
use ctfe_core::host::{Compilation, SourceUnit};
use ctfe_core::span::Location;
use proc_macro2::{LineColumn, Span};
use quote::ToTokens;
use syn::spanned::Spanned;

/// Source text with a line table, used to recover the verbatim text of a span.
#[derive(Debug, Clone)]
pub struct SourceText {
    text: String,
    line_starts: Vec<usize>,
}

impl SourceText {
    pub fn new(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text).to_string();
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, line_starts }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Byte offset of a line/column pair as reported by `proc_macro2`
    /// (1-based line, 0-based column counted in chars).
    pub fn offset(&self, position: LineColumn) -> Option<usize> {
        let start = *self.line_starts.get(position.line.checked_sub(1)?)?;
        let line = &self.text[start..];
        let mut chars = line.char_indices();
        for _ in 0..position.column {
            let (_, c) = chars.next()?;
            if c == '\n' {
                return None;
            }
        }
        let delta = chars.next().map(|(i, _)| i).unwrap_or(line.len());
        Some(start + delta)
    }

    pub fn slice(&self, span: Span) -> Option<&str> {
        let start = self.offset(span.start())?;
        let end = self.offset(span.end())?;
        self.text.get(start..end)
    }

    /// Verbatim text of a syntax node, falling back to its token rendering
    /// when the span does not map onto this file.
    pub fn source_of<T: Spanned + ToTokens>(&self, node: &T) -> String {
        match self.slice(node.span()) {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => node.to_token_stream().to_string(),
        }
    }

    pub fn location(&self, path: &Path, span: Span) -> Location {
        let start = span.start();
        Location::new(path, start.line as u32, start.column as u32 + 1)
    }
}

pub struct ParsedUnit {
    pub unit: SourceUnit,
    pub file: syn::File,
    pub text: SourceText,
}

/// Every unit of a compilation, parsed.
pub struct ParsedCrate {
    pub crate_name: String,
    pub units: Vec<ParsedUnit>,
}

impl ParsedCrate {
    pub fn parse(compilation: &Compilation) -> Result<Self> {
        let mut units = Vec::with_capacity(compilation.units.len());
        for unit in &compilation.units {
            let file = syn::parse_file(&unit.text)
                .map_err(|e| Error::syntax(unit.path.display().to_string(), e))?;
            units.push(ParsedUnit {
                text: SourceText::new(&unit.text),
                unit: unit.clone(),
                file,
            });
        }
        Ok(Self {
            crate_name: compilation.crate_name.clone(),
            units,
        })
    }

    pub fn unit(&self, module_path: &[String]) -> Option<&ParsedUnit> {
        self.units
            .iter()
            .find(|parsed| parsed.unit.module_path == module_path)
    }

    /// Items of a module, whether it lives in its own file or inline in an
    /// ancestor's file.
    pub fn module_items(&self, module_path: &[String]) -> Option<&[syn::Item]> {
        if let Some(parsed) = self.unit(module_path) {
            return Some(&parsed.file.items);
        }
        self.units.iter().find_map(|parsed| {
            let rest = module_path.strip_prefix(parsed.unit.module_path.as_slice())?;
            inline_items(&parsed.file.items, rest)
        })
    }

    /// Outer attributes on the `mod name;` declaration of a file module.
    pub fn declaration_attrs(&self, module_path: &[String]) -> Vec<syn::Attribute> {
        let Some((name, parent)) = module_path.split_last() else {
            return Vec::new();
        };
        self.module_items(parent)
            .and_then(|items| {
                items.iter().find_map(|item| match item {
                    syn::Item::Mod(m) if m.ident == name && m.content.is_none() => {
                        Some(m.attrs.clone())
                    }
                    _ => None,
                })
            })
            .unwrap_or_default()
    }
}

fn inline_items<'a>(items: &'a [syn::Item], rest: &[String]) -> Option<&'a [syn::Item]> {
    let Some((first, tail)) = rest.split_first() else {
        return Some(items);
    };
    items.iter().find_map(|item| match item {
        syn::Item::Mod(m) if m.ident == first => {
            let (_, inner) = m.content.as_ref()?;
            inline_items(inner, tail)
        }
        _ => None,
    })
}

/// Directory that relative paths of a crate rooted at `root` are resolved
/// against: the package directory when the root sits in `src/`.
pub fn crate_dir(root: &Path) -> PathBuf {
    let parent = root.parent().unwrap_or(Path::new("."));
    match parent.file_name() {
        Some(name) if name == "src" => parent.parent().unwrap_or(parent).to_path_buf(),
        _ => parent.to_path_buf(),
    }
}

pub fn default_crate_name(root: &Path) -> String {
    crate_dir(root)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.replace('-', "_"))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "main".to_string())
}

/// Load a crate from its root file, following `mod name;` declarations.
pub fn load_crate(root: &Path, crate_name: Option<&str>) -> Result<Compilation> {
    let base_dir = crate_dir(root);
    let crate_name = crate_name
        .map(str::to_string)
        .unwrap_or_else(|| default_crate_name(root));
    let mut loader = Loader {
        base_dir: base_dir.clone(),
        units: Vec::new(),
    };
    loader.load_file(root, Vec::new(), true)?;
    tracing::debug!("Loaded {} source file(s) for crate {}", loader.units.len(), crate_name);

    let mut compilation = Compilation::new(crate_name).with_base_dir(base_dir);
    compilation.units = loader.units;
    Ok(compilation)
}

struct Loader {
    base_dir: PathBuf,
    units: Vec<SourceUnit>,
}

impl Loader {
    fn load_file(&mut self, path: &Path, module_path: Vec<String>, owns_dir: bool) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let display = path.strip_prefix(&self.base_dir).unwrap_or(path).to_path_buf();
        let file = syn::parse_file(&text)
            .map_err(|e| Error::syntax(display.display().to_string(), e))?;

        let parent = path.parent().unwrap_or(Path::new("."));
        let dir = if owns_dir {
            parent.to_path_buf()
        } else {
            let stem = path.file_stem().unwrap_or_default();
            parent.join(stem)
        };

        self.units
            .push(SourceUnit::new(display, module_path.clone(), text));
        self.load_children(&file.items, &dir, &module_path)
    }

    fn load_children(&mut self, items: &[syn::Item], dir: &Path, module_path: &[String]) -> Result<()> {
        for item in items {
            let syn::Item::Mod(m) = item else {
                continue;
            };
            let name = m.ident.to_string();
            let mut child = module_path.to_vec();
            child.push(name.clone());

            if let Some((_, inner)) = &m.content {
                self.load_children(inner, &dir.join(&name), &child)?;
                continue;
            }

            let candidates = match path_attr(&m.attrs) {
                Some(explicit) => vec![(dir.join(explicit), true)],
                None => vec![
                    (dir.join(format!("{}.rs", name)), false),
                    (dir.join(&name).join("mod.rs"), true),
                ],
            };
            match candidates.into_iter().find(|(path, _)| path.is_file()) {
                Some((path, owns_dir)) => self.load_file(&path, child, owns_dir)?,
                None => tracing::warn!("No source file found for module {}", child.join("::")),
            }
        }
        Ok(())
    }
}

fn path_attr(attrs: &[syn::Attribute]) -> Option<String> {
    attrs.iter().find_map(|attr| {
        if !attr.path().is_ident("path") {
            return None;
        }
        let syn::Meta::NameValue(nv) = &attr.meta else {
            return None;
        };
        match &nv.value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(s),
                ..
            }) => Some(s.value()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn slices_span_text_verbatim() {
        let text = SourceText::new("fn main() {\n    let x = factorial( 5 ,);\n}\n");
        let file = syn::parse_file(text.as_str()).unwrap();
        let syn::Item::Fn(f) = &file.items[0] else {
            panic!("expected fn");
        };
        let syn::Stmt::Local(local) = &f.block.stmts[0] else {
            panic!("expected let");
        };
        let init = &local.init.as_ref().unwrap().expr;
        assert_eq!(text.source_of(init.as_ref()), "factorial( 5 ,)");
        let location = text.location(Path::new("src/main.rs"), init.span());
        assert_eq!((location.line, location.column), (2, 13));
    }

    #[test]
    fn columns_count_characters() {
        let text = SourceText::new("const É: &str = \"ü\"; const B: u8 = 1;\n");
        let offset = text.offset(LineColumn { line: 1, column: 7 }).unwrap();
        assert_eq!(&text.as_str()[offset..offset + 1], ":");
    }

    #[test]
    fn loads_file_modules() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("demo-crate").join("src");
        fs::create_dir_all(src.join("math")).unwrap();
        fs::write(src.join("lib.rs"), "mod math;\nmod missing;\n").unwrap();
        fs::write(src.join("math.rs"), "pub mod trig;\npub fn one() -> u8 { 1 }\n").unwrap();
        fs::write(src.join("math").join("trig.rs"), "pub fn zero() -> u8 { 0 }\n").unwrap();

        let compilation = load_crate(&src.join("lib.rs"), None).unwrap();
        assert_eq!(compilation.crate_name, "demo_crate");
        let modules: Vec<_> = compilation
            .units
            .iter()
            .map(|unit| unit.module_path.join("::"))
            .collect();
        assert_eq!(modules, vec!["", "math", "math::trig"]);
        assert_eq!(compilation.units[1].path, PathBuf::from("src/math.rs"));
    }
}
