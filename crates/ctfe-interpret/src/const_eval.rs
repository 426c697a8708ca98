//! Shape-guided evaluation of constant Rust expressions.
//!
//! Covers the expressions the literal serializer writes plus the usual
//! spellings of constant arguments: literals, arithmetic, casts between
//! integer widths, `MIN`/`MAX` and float constants, `Some`/`None`, string
//! conversions, `vec![..]`, arrays and the `from`/`new` constructors of the
//! supported collections.

use ctfe_core::shape::{MapKind, Primitive, SeqKind, Shape};
use ctfe_core::value::Value;
use quote::ToTokens;

use crate::error::{EvalError, Result};

pub fn evaluate_text(text: &str, shape: &Shape) -> Result<Value> {
    let expr: syn::Expr = syn::parse_str(text)
        .map_err(|e| EvalError::Decode(format!("`{}` is not an expression: {}", text, e)))?;
    evaluate(&expr, shape)
}

pub fn evaluate(expr: &syn::Expr, shape: &Shape) -> Result<Value> {
    eval(expr, shape).map_err(EvalError::Decode)
}

type Eval<T> = std::result::Result<T, String>;

fn strip(expr: &syn::Expr) -> &syn::Expr {
    match expr {
        syn::Expr::Paren(p) => strip(&p.expr),
        syn::Expr::Group(g) => strip(&g.expr),
        other => other,
    }
}

fn unsupported(expr: &syn::Expr, shape: &dyn std::fmt::Display) -> String {
    format!(
        "cannot evaluate `{}` as `{}`",
        expr.to_token_stream(),
        shape
    )
}

fn idents(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|s| s.ident.to_string()).collect()
}

/// Last two segments of a call's function path, e.g. `["HashMap", "from"]`.
fn constructor(call: &syn::ExprCall) -> Option<(String, String)> {
    let syn::Expr::Path(p) = strip(&call.func) else {
        return None;
    };
    let segments = idents(&p.path);
    match segments.as_slice() {
        [.., ty, method] => Some((ty.clone(), method.clone())),
        _ => None,
    }
}

fn eval(expr: &syn::Expr, shape: &Shape) -> Eval<Value> {
    let expr = strip(expr);
    match shape {
        Shape::Primitive(p) if p.is_integer() => eval_integer(expr, *p),
        Shape::Primitive(Primitive::F32) => eval_f32(expr).map(Value::F32),
        Shape::Primitive(Primitive::F64) => eval_f64(expr).map(Value::F64),
        Shape::Primitive(Primitive::Bool) => eval_bool(expr).map(Value::Bool),
        Shape::Primitive(_) => match expr {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Char(c),
                ..
            }) => Ok(Value::Char(c.value())),
            _ => Err(unsupported(expr, shape)),
        },
        Shape::StaticStr => eval_str(expr).map(Value::Str),
        Shape::String => eval_string(expr).map(Value::Str),
        Shape::Option(inner) => match expr {
            syn::Expr::Path(p) if p.path.is_ident("None") => Ok(Value::Null),
            syn::Expr::Call(call) if call.args.len() == 1 => match strip(&call.func) {
                syn::Expr::Path(p) if p.path.is_ident("Some") => {
                    Ok(Value::Some(Box::new(eval(&call.args[0], inner)?)))
                }
                _ => Err(unsupported(expr, shape)),
            },
            _ => Err(unsupported(expr, shape)),
        },
        Shape::Seq { kind, elem } => eval_seq(expr, *kind, elem, shape).map(Value::Seq),
        Shape::Array { elem, len } => {
            let items = elements(expr, elem).ok_or_else(|| unsupported(expr, shape))??;
            if items.len() != *len {
                return Err(format!(
                    "expected {} elements for `{}` but found {}",
                    len,
                    shape,
                    items.len()
                ));
            }
            Ok(Value::Seq(items))
        }
        Shape::Map { kind, key, value } => eval_map(expr, *kind, key, value, shape),
    }
}

/// Elements of an array or repeat expression; `None` for anything else.
fn elements(expr: &syn::Expr, elem: &Shape) -> Option<Eval<Vec<Value>>> {
    match strip(expr) {
        syn::Expr::Array(array) => Some(array.elems.iter().map(|e| eval(e, elem)).collect()),
        syn::Expr::Repeat(repeat) => Some((|| {
            let count = match eval_integer(&repeat.len, Primitive::Usize)? {
                Value::Usize(n) => n as usize,
                _ => return Err("invalid repeat count".to_string()),
            };
            let item = eval(&repeat.expr, elem)?;
            Ok(vec![item; count])
        })()),
        _ => None,
    }
}

fn eval_seq(expr: &syn::Expr, kind: SeqKind, elem: &Shape, shape: &Shape) -> Eval<Vec<Value>> {
    match (kind, expr) {
        (SeqKind::Vec, syn::Expr::Macro(m)) if m.mac.path.is_ident("vec") => {
            let tokens = &m.mac.tokens;
            let inner: syn::Expr = syn::parse2(quote::quote!([#tokens]))
                .map_err(|e| format!("invalid `vec!` arguments: {}", e))?;
            elements(&inner, elem).ok_or_else(|| unsupported(expr, shape))?
        }
        (SeqKind::StaticSlice, syn::Expr::Reference(r)) if r.mutability.is_none() => {
            elements(&r.expr, elem).ok_or_else(|| unsupported(expr, shape))?
        }
        (SeqKind::Vec | SeqKind::VecDeque, syn::Expr::Call(call)) => {
            let Some((ty, method)) = constructor(call) else {
                return Err(unsupported(expr, shape));
            };
            let expected = if kind == SeqKind::Vec { "Vec" } else { "VecDeque" };
            if ty != expected {
                return Err(unsupported(expr, shape));
            }
            match (method.as_str(), call.args.len()) {
                ("new", 0) => Ok(Vec::new()),
                ("from", 1) => elements(&call.args[0], elem).ok_or_else(|| unsupported(expr, shape))?,
                _ => Err(unsupported(expr, shape)),
            }
        }
        _ => Err(unsupported(expr, shape)),
    }
}

fn eval_map(expr: &syn::Expr, kind: MapKind, key: &Shape, value: &Shape, shape: &Shape) -> Eval<Value> {
    let syn::Expr::Call(call) = expr else {
        return Err(unsupported(expr, shape));
    };
    let expected = match kind {
        MapKind::HashMap => "HashMap",
        MapKind::BTreeMap => "BTreeMap",
    };
    match constructor(call) {
        Some((ty, method)) if ty == expected => match (method.as_str(), call.args.len()) {
            ("new", 0) => Ok(Value::Map(Vec::new())),
            ("from", 1) => {
                let syn::Expr::Array(array) = strip(&call.args[0]) else {
                    return Err(unsupported(expr, shape));
                };
                let mut pairs = Vec::with_capacity(array.elems.len());
                for pair in &array.elems {
                    match strip(pair) {
                        syn::Expr::Tuple(t) if t.elems.len() == 2 => {
                            pairs.push((eval(&t.elems[0], key)?, eval(&t.elems[1], value)?));
                        }
                        other => return Err(format!("`{}` is not a key/value pair", other.to_token_stream())),
                    }
                }
                Ok(Value::Map(pairs))
            }
            _ => Err(unsupported(expr, shape)),
        },
        _ => Err(unsupported(expr, shape)),
    }
}

fn eval_bool(expr: &syn::Expr) -> Eval<bool> {
    match strip(expr) {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Bool(b),
            ..
        }) => Ok(b.value),
        syn::Expr::Unary(u) if matches!(u.op, syn::UnOp::Not(_)) => Ok(!eval_bool(&u.expr)?),
        syn::Expr::Binary(b) => match b.op {
            syn::BinOp::And(_) => Ok(eval_bool(&b.left)? && eval_bool(&b.right)?),
            syn::BinOp::Or(_) => Ok(eval_bool(&b.left)? || eval_bool(&b.right)?),
            _ => Err(unsupported(expr, &"bool")),
        },
        other => Err(unsupported(other, &"bool")),
    }
}

fn eval_str(expr: &syn::Expr) -> Eval<String> {
    match strip(expr) {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(s),
            ..
        }) => Ok(s.value()),
        other => Err(unsupported(other, &"&'static str")),
    }
}

fn eval_string(expr: &syn::Expr) -> Eval<String> {
    match strip(expr) {
        syn::Expr::MethodCall(m)
            if m.args.is_empty() && ["to_string", "to_owned", "into"].iter().any(|n| m.method == n) =>
        {
            eval_str(&m.receiver)
        }
        syn::Expr::Call(call) => match (constructor(call), call.args.len()) {
            (Some((ty, method)), 1) if ty == "String" && method == "from" => eval_str(&call.args[0]),
            (Some((ty, method)), 0) if ty == "String" && method == "new" => Ok(String::new()),
            _ => Err(unsupported(expr, &"String")),
        },
        other => eval_str(other),
    }
}

fn check_suffix(suffix: &str, primitive: Primitive) -> Eval<()> {
    if suffix.is_empty() || suffix == primitive.name() {
        Ok(())
    } else {
        Err(format!("`{}` literal where `{}` is expected", suffix, primitive))
    }
}

/// Inclusive bounds of an integer primitive. Pointer-sized types are taken
/// as 64 bits.
fn bounds(primitive: Primitive) -> (i128, u128) {
    match primitive {
        Primitive::I8 => (i8::MIN as i128, i8::MAX as u128),
        Primitive::I16 => (i16::MIN as i128, i16::MAX as u128),
        Primitive::I32 => (i32::MIN as i128, i32::MAX as u128),
        Primitive::I64 | Primitive::Isize => (i64::MIN as i128, i64::MAX as u128),
        Primitive::I128 => (i128::MIN, i128::MAX as u128),
        Primitive::U8 => (0, u8::MAX as u128),
        Primitive::U16 => (0, u16::MAX as u128),
        Primitive::U32 => (0, u32::MAX as u128),
        Primitive::U64 | Primitive::Usize => (0, u64::MAX as u128),
        _ => (0, u128::MAX),
    }
}

fn eval_integer(expr: &syn::Expr, primitive: Primitive) -> Eval<Value> {
    let expr = strip(expr);
    if primitive == Primitive::U128 {
        // values above i128::MAX only appear as plain literals or `u128::MAX`
        match expr {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Int(i),
                ..
            }) => {
                check_suffix(i.suffix(), primitive)?;
                return i
                    .base10_parse::<u128>()
                    .map(Value::U128)
                    .map_err(|e| e.to_string());
            }
            syn::Expr::Path(p) if idents(&p.path) == ["u128", "MAX"] => {
                return Ok(Value::U128(u128::MAX))
            }
            _ => {}
        }
    }
    let n = integer(expr, primitive)?;
    let magnitude = n.unsigned_abs();
    Value::integer(primitive, n < 0, magnitude)
        .ok_or_else(|| format!("`{}` does not fit in `{}`", n, primitive))
}

fn integer(expr: &syn::Expr, primitive: Primitive) -> Eval<i128> {
    let expr = strip(expr);
    let (min, max) = bounds(primitive);
    let fit = |n: i128| -> Eval<i128> {
        if n < min || (n >= 0 && n as u128 > max) {
            Err(format!("`{}` overflows `{}`", expr.to_token_stream(), primitive))
        } else {
            Ok(n)
        }
    };
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(i),
            ..
        }) => {
            check_suffix(i.suffix(), primitive)?;
            let n = i.base10_parse::<u128>().map_err(|e| e.to_string())?;
            i128::try_from(n)
                .map_err(|_| format!("`{}` overflows `{}`", n, primitive))
                .and_then(fit)
        }
        syn::Expr::Unary(u) if matches!(u.op, syn::UnOp::Neg(_)) => {
            // `-128i8` is a negated literal that is only in range once negated
            let inner = match strip(&u.expr) {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Int(i),
                    ..
                }) => {
                    check_suffix(i.suffix(), primitive)?;
                    let n = i.base10_parse::<u128>().map_err(|e| e.to_string())?;
                    if n == 1u128 << 127 {
                        return fit(i128::MIN);
                    }
                    i128::try_from(n).map_err(|_| format!("`{}` overflows `{}`", n, primitive))?
                }
                other => integer(other, primitive)?,
            };
            inner
                .checked_neg()
                .ok_or_else(|| format!("`{}` overflows `{}`", expr.to_token_stream(), primitive))
                .and_then(fit)
        }
        syn::Expr::Unary(u) if matches!(u.op, syn::UnOp::Not(_)) => {
            let n = integer(&u.expr, primitive)?;
            if primitive.is_signed() {
                fit(!n)
            } else {
                fit(max as i128 - n)
            }
        }
        syn::Expr::Binary(b) => {
            let l = integer(&b.left, primitive)?;
            let r = integer(&b.right, primitive)?;
            let result = match b.op {
                syn::BinOp::Add(_) => l.checked_add(r),
                syn::BinOp::Sub(_) => l.checked_sub(r),
                syn::BinOp::Mul(_) => l.checked_mul(r),
                syn::BinOp::Div(_) => l.checked_div(r),
                syn::BinOp::Rem(_) => l.checked_rem(r),
                syn::BinOp::BitAnd(_) => Some(l & r),
                syn::BinOp::BitOr(_) => Some(l | r),
                syn::BinOp::BitXor(_) => Some(l ^ r),
                syn::BinOp::Shl(_) => u32::try_from(r).ok().and_then(|r| l.checked_shl(r)),
                syn::BinOp::Shr(_) => u32::try_from(r).ok().and_then(|r| l.checked_shr(r)),
                _ => return Err(unsupported(expr, &primitive)),
            };
            result
                .ok_or_else(|| format!("`{}` overflows `{}`", expr.to_token_stream(), primitive))
                .and_then(fit)
        }
        syn::Expr::Path(p) => {
            let segments = idents(&p.path);
            match segments.as_slice() {
                [ty, name] if ty == primitive.name() && name == "MAX" => Ok(max as i128),
                [ty, name] if ty == primitive.name() && name == "MIN" => Ok(min),
                _ => Err(unsupported(expr, &primitive)),
            }
        }
        syn::Expr::Cast(cast) => {
            let target = match cast.ty.as_ref() {
                syn::Type::Path(p) => p.path.get_ident().and_then(|i| Primitive::from_name(&i.to_string())),
                _ => None,
            };
            if target != Some(primitive) {
                return Err(unsupported(expr, &primitive));
            }
            let source = infer_integer(&cast.expr);
            let n = integer(&cast.expr, source)?;
            Ok(truncate(n, primitive))
        }
        other => Err(unsupported(other, &primitive)),
    }
}

/// Integer type of an operand written without context: a literal suffix,
/// a `T::MAX` path or a cast target, else `i32`.
fn infer_integer(expr: &syn::Expr) -> Primitive {
    match strip(expr) {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(i),
            ..
        }) => Primitive::from_name(i.suffix()).unwrap_or(Primitive::I32),
        syn::Expr::Path(p) => p
            .path
            .segments
            .first()
            .and_then(|s| Primitive::from_name(&s.ident.to_string()))
            .filter(|p| p.is_integer())
            .unwrap_or(Primitive::I32),
        syn::Expr::Cast(cast) => match cast.ty.as_ref() {
            syn::Type::Path(p) => p
                .path
                .get_ident()
                .and_then(|i| Primitive::from_name(&i.to_string()))
                .unwrap_or(Primitive::I32),
            _ => Primitive::I32,
        },
        syn::Expr::Unary(u) => infer_integer(&u.expr),
        syn::Expr::Binary(b) => match infer_integer(&b.left) {
            Primitive::I32 => infer_integer(&b.right),
            other => other,
        },
        _ => Primitive::I32,
    }
}

fn truncate(n: i128, to: Primitive) -> i128 {
    match to {
        Primitive::I8 => n as i8 as i128,
        Primitive::I16 => n as i16 as i128,
        Primitive::I32 => n as i32 as i128,
        Primitive::I64 | Primitive::Isize => n as i64 as i128,
        Primitive::U8 => n as u8 as i128,
        Primitive::U16 => n as u16 as i128,
        Primitive::U32 => n as u32 as i128,
        Primitive::U64 | Primitive::Usize => n as u64 as i128,
        _ => n,
    }
}

macro_rules! float_evaluator {
    ($name:ident, $ty:ident, $prim:ident) => {
        fn $name(expr: &syn::Expr) -> Eval<$ty> {
            match strip(expr) {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Float(f),
                    ..
                }) => {
                    check_suffix(f.suffix(), Primitive::$prim)?;
                    f.base10_parse::<$ty>().map_err(|e| e.to_string())
                }
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Int(i),
                    ..
                }) if i.suffix() == stringify!($ty) => {
                    i.base10_parse::<$ty>().map_err(|e| e.to_string())
                }
                syn::Expr::Unary(u) if matches!(u.op, syn::UnOp::Neg(_)) => Ok(-$name(&u.expr)?),
                syn::Expr::Binary(b) => {
                    let l = $name(&b.left)?;
                    let r = $name(&b.right)?;
                    match b.op {
                        syn::BinOp::Add(_) => Ok(l + r),
                        syn::BinOp::Sub(_) => Ok(l - r),
                        syn::BinOp::Mul(_) => Ok(l * r),
                        syn::BinOp::Div(_) => Ok(l / r),
                        syn::BinOp::Rem(_) => Ok(l % r),
                        _ => Err(unsupported(expr, &stringify!($ty))),
                    }
                }
                syn::Expr::Path(p) => {
                    let segments = idents(&p.path);
                    let n = segments.len();
                    let named = n >= 2
                        && (segments[n - 2] == stringify!($ty)
                            || (n >= 3 && segments[n - 2] == "consts" && segments[n - 3] == stringify!($ty)));
                    if !named {
                        return Err(unsupported(expr, &stringify!($ty)));
                    }
                    match segments[n - 1].as_str() {
                        "NAN" => Ok($ty::NAN),
                        "INFINITY" => Ok($ty::INFINITY),
                        "NEG_INFINITY" => Ok($ty::NEG_INFINITY),
                        "MAX" => Ok($ty::MAX),
                        "MIN" => Ok($ty::MIN),
                        "MIN_POSITIVE" => Ok($ty::MIN_POSITIVE),
                        "EPSILON" => Ok($ty::EPSILON),
                        "PI" => Ok(std::$ty::consts::PI),
                        "TAU" => Ok(std::$ty::consts::TAU),
                        "E" => Ok(std::$ty::consts::E),
                        "SQRT_2" => Ok(std::$ty::consts::SQRT_2),
                        "LN_2" => Ok(std::$ty::consts::LN_2),
                        "LN_10" => Ok(std::$ty::consts::LN_10),
                        _ => Err(unsupported(expr, &stringify!($ty))),
                    }
                }
                other => Err(unsupported(other, &stringify!($ty))),
            }
        }
    };
}

float_evaluator!(eval_f32, f32, F32);
float_evaluator!(eval_f64, f64, F64);

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::shape::Primitive::*;
    use pretty_assertions::assert_eq;

    fn eval_as(text: &str, shape: Shape) -> Value {
        evaluate_text(text, &shape).unwrap()
    }

    #[test]
    fn integer_expressions() {
        assert_eq!(eval_as("1 + 2 * 3", Shape::Primitive(I32)), Value::I32(7));
        assert_eq!(eval_as("-128i8", Shape::Primitive(I8)), Value::I8(-128));
        assert_eq!(eval_as("u8::MAX", Shape::Primitive(U8)), Value::U8(255));
        assert_eq!(eval_as("300u16 as u8", Shape::Primitive(U8)), Value::U8(44));
        assert_eq!(eval_as("1 << 40", Shape::Primitive(U64)), Value::U64(1 << 40));
        assert_eq!(
            eval_as("340282366920938463463374607431768211455u128", Shape::Primitive(U128)),
            Value::U128(u128::MAX)
        );
        assert!(evaluate_text("255 + 1", &Shape::Primitive(U8)).is_err());
        assert!(evaluate_text("1u64", &Shape::Primitive(U8)).is_err());
    }

    #[test]
    fn float_expressions() {
        assert_eq!(eval_as("0.1", Shape::Primitive(F64)), Value::F64(0.1));
        assert_eq!(eval_as("1.5f32", Shape::Primitive(F32)), Value::F32(1.5));
        assert_eq!(eval_as("f64::NAN", Shape::Primitive(F64)), Value::F64(f64::NAN));
        assert_eq!(
            eval_as("-std::f64::consts::PI", Shape::Primitive(F64)),
            Value::F64(-std::f64::consts::PI)
        );
        assert_eq!(
            eval_as("f32::NEG_INFINITY", Shape::Primitive(F32)),
            Value::F32(f32::NEG_INFINITY)
        );
    }

    #[test]
    fn strings_and_options() {
        assert_eq!(
            eval_as(r#""Hello\nWorld".to_string()"#, Shape::String),
            Value::str("Hello\nWorld")
        );
        assert_eq!(eval_as(r#"String::from("a")"#, Shape::String), Value::str("a"));
        assert_eq!(
            eval_as("Some('x')", Shape::Option(Box::new(Shape::Primitive(Char)))),
            Value::Some(Box::new(Value::Char('x')))
        );
        assert_eq!(eval_as("None", Shape::Option(Box::new(Shape::StaticStr))), Value::Null);
    }

    #[test]
    fn collections() {
        assert_eq!(
            eval_as("vec![1u64, 1u64, 2u64]", Shape::vec(Shape::Primitive(U64))),
            Value::Seq(vec![Value::U64(1), Value::U64(1), Value::U64(2)])
        );
        assert_eq!(
            eval_as("vec![0u8; 3]", Shape::vec(Shape::Primitive(U8))),
            Value::Seq(vec![Value::U8(0); 3])
        );
        let deque = Shape::Seq {
            kind: SeqKind::VecDeque,
            elem: Box::new(Shape::Primitive(I32)),
        };
        assert_eq!(
            eval_as("::std::collections::VecDeque::from([1, 2])", deque),
            Value::Seq(vec![Value::I32(1), Value::I32(2)])
        );
        let map = Shape::map(MapKind::HashMap, Shape::String, Shape::Primitive(U32));
        assert_eq!(
            eval_as(
                r#"::std::collections::HashMap::from([("a".to_string(), 1u32), ("b".to_string(), 2u32)])"#,
                map
            ),
            Value::Map(vec![
                (Value::str("a"), Value::U32(1)),
                (Value::str("b"), Value::U32(2))
            ])
        );
        let array = Shape::Array {
            elem: Box::new(Shape::Primitive(Bool)),
            len: 2,
        };
        assert!(evaluate_text("[true]", &array).is_err());
    }

    #[test]
    fn serialized_literals_evaluate_back() {
        let shape = Shape::map(
            MapKind::BTreeMap,
            Shape::StaticStr,
            Shape::vec(Shape::Option(Box::new(Shape::Primitive(F32)))),
        );
        let value = Value::Map(vec![
            (Value::str("x"), Value::Seq(vec![Value::Some(Box::new(Value::F32(f32::NAN))), Value::Null])),
            (Value::str("y\"z"), Value::Seq(vec![Value::Some(Box::new(Value::F32(-0.25)))])),
        ]);
        let literal = ctfe_rust::serialize(&value, &shape).unwrap();
        assert_eq!(evaluate_text(literal.as_str(), &shape).unwrap(), value);
    }
}
