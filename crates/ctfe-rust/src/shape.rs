//! Deriving a [`Shape`] from a declared return type.

use ctfe_core::error::{Error, Result};
use ctfe_core::shape::{MapKind, Primitive, SeqKind, Shape};
use quote::ToTokens;

/// Roots under which the standard types may be spelled out in full.
const STD_ROOTS: &[&str] = &["std", "core", "alloc"];

pub fn shape_of(ty: &syn::Type) -> Result<Shape> {
    derive(ty).map_err(|reason| Error::UnsupportedType(format!("{}: {}", type_text(ty), reason)))
}

pub fn shape_of_text(text: &str) -> Result<Shape> {
    let ty: syn::Type = syn::parse_str(text)
        .map_err(|e| Error::UnsupportedType(format!("{}: {}", text, e)))?;
    shape_of(&ty)
}

fn derive(ty: &syn::Type) -> std::result::Result<Shape, String> {
    match ty {
        syn::Type::Paren(p) => derive(&p.elem),
        syn::Type::Group(g) => derive(&g.elem),
        syn::Type::Reference(r) => {
            if r.mutability.is_some() {
                return Err("mutable references have no literal form".to_string());
            }
            if let Some(lifetime) = &r.lifetime {
                if lifetime.ident != "static" {
                    return Err("only `'static` references can be generated".to_string());
                }
            }
            match r.elem.as_ref() {
                syn::Type::Path(p) if p.qself.is_none() && p.path.is_ident("str") => {
                    Ok(Shape::StaticStr)
                }
                syn::Type::Slice(s) => Ok(Shape::Seq {
                    kind: SeqKind::StaticSlice,
                    elem: Box::new(derive(&s.elem)?),
                }),
                _ => Err("only `&'static str` and `&'static [T]` references are supported".to_string()),
            }
        }
        syn::Type::Array(a) => {
            let len = match &a.len {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Int(n),
                    ..
                }) => n
                    .base10_parse::<usize>()
                    .map_err(|e| format!("invalid array length: {}", e))?,
                _ => return Err("array length must be an integer literal".to_string()),
            };
            Ok(Shape::Array {
                elem: Box::new(derive(&a.elem)?),
                len,
            })
        }
        syn::Type::Path(p) if p.qself.is_none() => derive_path(&p.path),
        syn::Type::Tuple(t) if t.elems.is_empty() => Err("`()` carries no value".to_string()),
        _ => Err("type has no literal form".to_string()),
    }
}

fn derive_path(path: &syn::Path) -> std::result::Result<Shape, String> {
    let segments: Vec<&syn::PathSegment> = path.segments.iter().collect();
    let Some((last, prefix)) = segments.split_last() else {
        return Err("empty path".to_string());
    };
    if let Some(root) = prefix.first() {
        if !STD_ROOTS.iter().any(|r| root.ident == r) {
            return Err("only standard library types are supported".to_string());
        }
    }
    for segment in prefix {
        if !segment.arguments.is_none() {
            return Err("unexpected generic arguments".to_string());
        }
    }

    let name = last.ident.to_string();
    let args = type_args(&last.arguments)?;
    let expect = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("`{}` expects {} type argument(s)", name, n))
        }
    };

    if let Some(primitive) = Primitive::from_name(&name) {
        expect(0)?;
        return Ok(Shape::Primitive(primitive));
    }
    match name.as_str() {
        "String" => {
            expect(0)?;
            Ok(Shape::String)
        }
        "Option" => {
            expect(1)?;
            Ok(Shape::Option(Box::new(derive(args[0])?)))
        }
        "Vec" | "VecDeque" => {
            expect(1)?;
            let kind = if name == "Vec" {
                SeqKind::Vec
            } else {
                SeqKind::VecDeque
            };
            Ok(Shape::Seq {
                kind,
                elem: Box::new(derive(args[0])?),
            })
        }
        "HashMap" | "BTreeMap" => {
            expect(2)?;
            let kind = if name == "HashMap" {
                MapKind::HashMap
            } else {
                MapKind::BTreeMap
            };
            let key = derive(args[0])?;
            if !key.is_key() {
                return Err(format!("`{}` is not supported as a map key", key));
            }
            Ok(Shape::map(kind, key, derive(args[1])?))
        }
        _ => Err(format!("`{}` has no literal form", name)),
    }
}

fn type_args(arguments: &syn::PathArguments) -> std::result::Result<Vec<&syn::Type>, String> {
    match arguments {
        syn::PathArguments::None => Ok(Vec::new()),
        syn::PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .map(|arg| match arg {
                syn::GenericArgument::Type(ty) => Ok(ty),
                _ => Err("only type arguments are supported".to_string()),
            })
            .collect(),
        syn::PathArguments::Parenthesized(_) => Err("function traits have no literal form".to_string()),
    }
}

/// Compact rendering of a type for messages.
pub fn type_text(ty: &syn::Type) -> String {
    let text = ty.to_token_stream().to_string();
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' {
            let prev = out.chars().last();
            let next = chars.peek().copied();
            let tight = matches!(prev, Some('<' | '&' | ':' | '[' | '('))
                || matches!(next, Some('<' | '>' | ',' | ':' | ']' | ')' | ';'));
            if tight {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Rejects return types the serializer cannot express at the position of a
/// generated slot. Runs before any evaluation.
pub fn check_return_capability(shape: &Shape) -> Result<()> {
    if let Shape::Array { .. } = shape {
        return Err(Error::UnsupportedType(format!(
            "{}: fixed-size arrays cannot be returned from a compile-time function; return a `Vec` or `&'static [T]`",
            shape
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn derives_nested_shapes() {
        assert_eq!(shape_of_text("u64").unwrap(), Shape::Primitive(Primitive::U64));
        assert_eq!(shape_of_text("&'static str").unwrap(), Shape::StaticStr);
        assert_eq!(
            shape_of_text("std::collections::HashMap<String, Vec<Option<f32>>>").unwrap(),
            Shape::map(
                MapKind::HashMap,
                Shape::String,
                Shape::vec(Shape::Option(Box::new(Shape::Primitive(Primitive::F32))))
            )
        );
        assert_eq!(
            shape_of_text("Vec<[u8; 4]>").unwrap(),
            Shape::vec(Shape::Array {
                elem: Box::new(Shape::Primitive(Primitive::U8)),
                len: 4
            })
        );
    }

    #[test]
    fn rejects_types_without_literal_form() {
        for text in [
            "()",
            "Box<u8>",
            "HashMap<f64, u8>",
            "&mut str",
            "Option<fn()>",
            "serde_json::Value",
            "HashMap<u8, u8, S>",
        ] {
            assert!(shape_of_text(text).is_err(), "{} should be rejected", text);
        }
    }

    #[test]
    fn top_level_arrays_fail_the_capability_check() {
        let shape = shape_of_text("[i32; 3]").unwrap();
        assert!(check_return_capability(&shape).is_err());
        assert!(check_return_capability(&shape_of_text("Vec<[i32; 3]>").unwrap()).is_ok());
    }

    #[test]
    fn type_text_is_compact() {
        let ty: syn::Type = syn::parse_str("Vec < & 'static str >").unwrap();
        assert_eq!(type_text(&ty), "Vec<&'static str>");
        let ty: syn::Type = syn::parse_str("[u8 ; 4]").unwrap();
        assert_eq!(type_text(&ty), "[u8; 4]");
    }
}
