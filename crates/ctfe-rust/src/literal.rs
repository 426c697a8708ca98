//! Writing evaluated values back as Rust expressions.
//!
//! The literal must reproduce the value exactly when compiled at the
//! position of a slot of the declared type. Integers other than `i32` and
//! floats other than `f64` carry a suffix so nested positions infer the
//! right width.

use std::fmt::Write;

use ctfe_core::bail;
use ctfe_core::error::Result;
use ctfe_core::model::SerializedLiteral;
use ctfe_core::shape::{Primitive, SeqKind, Shape};
use ctfe_core::value::Value;
use proc_macro2::Literal;

pub fn serialize(value: &Value, shape: &Shape) -> Result<SerializedLiteral> {
    let mut out = String::new();
    write_value(value, shape, &mut out)?;
    Ok(SerializedLiteral::new(out))
}

fn write_value(value: &Value, shape: &Shape, out: &mut String) -> Result<()> {
    match (shape, value) {
        (Shape::Primitive(p), v) if v.primitive() == Some(*p) => write_primitive(v, *p, out),
        (Shape::String, Value::Str(s)) => {
            let _ = write!(out, "{}.to_string()", Literal::string(s));
            Ok(())
        }
        (Shape::StaticStr, Value::Str(s)) => {
            let _ = write!(out, "{}", Literal::string(s));
            Ok(())
        }
        (Shape::Option(_), Value::Null) => {
            out.push_str("None");
            Ok(())
        }
        (Shape::Option(inner), Value::Some(v)) => {
            out.push_str("Some(");
            write_value(v, inner, out)?;
            out.push(')');
            Ok(())
        }
        (Shape::Seq { kind, elem }, Value::Seq(items)) => {
            let (open, close) = match kind {
                SeqKind::Vec => ("vec![", "]"),
                SeqKind::VecDeque => ("::std::collections::VecDeque::from([", "])"),
                SeqKind::StaticSlice => ("&[", "]"),
            };
            out.push_str(open);
            write_items(items, elem, out)?;
            out.push_str(close);
            Ok(())
        }
        (Shape::Array { elem, len }, Value::Seq(items)) => {
            if items.len() != *len {
                bail!("expected {} elements for `{}` but found {}", len, shape, items.len());
            }
            out.push('[');
            write_items(items, elem, out)?;
            out.push(']');
            Ok(())
        }
        (Shape::Map { kind, key, value: value_shape }, Value::Map(pairs)) => {
            out.push_str(kind.path());
            out.push_str("::from([");
            for (index, (k, v)) in pairs.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push('(');
                write_value(k, key, out)?;
                out.push_str(", ");
                write_value(v, value_shape, out)?;
                out.push(')');
            }
            out.push_str("])");
            Ok(())
        }
        _ => bail!("expected `{}` but the value is {}", shape, value.kind_name()),
    }
}

fn write_items(items: &[Value], elem: &Shape, out: &mut String) -> Result<()> {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        write_value(item, elem, out)?;
    }
    Ok(())
}

fn write_primitive(value: &Value, primitive: Primitive, out: &mut String) -> Result<()> {
    let _ = match *value {
        Value::Bool(b) => write!(out, "{}", b),
        Value::Char(c) => write!(out, "{}", Literal::character(c)),
        Value::I32(v) => write!(out, "{}", v),
        Value::F32(v) => write_float(out, v.is_nan(), v.is_infinite(), v < 0.0, "f32", format!("{:?}", v)),
        Value::F64(v) => write_float(out, v.is_nan(), v.is_infinite(), v < 0.0, "f64", format!("{:?}", v)),
        ref integer => match integer.as_i128() {
            Some(v) => write!(out, "{}{}", v, primitive.name()),
            // u128 values above i128::MAX
            None => match integer {
                Value::U128(v) => write!(out, "{}u128", v),
                _ => bail!("expected `{}` but the value is {}", primitive, value.kind_name()),
            },
        },
    };
    Ok(())
}

fn write_float(
    out: &mut String,
    nan: bool,
    infinite: bool,
    negative: bool,
    ty: &str,
    finite: String,
) -> std::fmt::Result {
    if nan {
        write!(out, "{}::NAN", ty)
    } else if infinite && negative {
        write!(out, "{}::NEG_INFINITY", ty)
    } else if infinite {
        write!(out, "{}::INFINITY", ty)
    } else if ty == "f64" {
        out.push_str(&finite);
        Ok(())
    } else {
        write!(out, "{}{}", finite, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::shape::MapKind;
    use pretty_assertions::assert_eq;

    fn literal(value: Value, shape: Shape) -> String {
        serialize(&value, &shape).unwrap().into_string()
    }

    #[test]
    fn integers_carry_suffixes_except_i32() {
        assert_eq!(literal(Value::U64(120), Shape::Primitive(Primitive::U64)), "120u64");
        assert_eq!(literal(Value::I32(-7), Shape::Primitive(Primitive::I32)), "-7");
        assert_eq!(
            literal(Value::I128(i128::MIN), Shape::Primitive(Primitive::I128)),
            "-170141183460469231731687303715884105728i128"
        );
        assert_eq!(
            literal(Value::U128(u128::MAX), Shape::Primitive(Primitive::U128)),
            "340282366920938463463374607431768211455u128"
        );
    }

    #[test]
    fn floats_round_trip_and_name_special_values() {
        assert_eq!(literal(Value::F64(0.1), Shape::Primitive(Primitive::F64)), "0.1");
        assert_eq!(literal(Value::F64(2.0), Shape::Primitive(Primitive::F64)), "2.0");
        assert_eq!(literal(Value::F32(1.5), Shape::Primitive(Primitive::F32)), "1.5f32");
        assert_eq!(literal(Value::F64(f64::NAN), Shape::Primitive(Primitive::F64)), "f64::NAN");
        assert_eq!(
            literal(Value::F32(f32::NEG_INFINITY), Shape::Primitive(Primitive::F32)),
            "f32::NEG_INFINITY"
        );
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(
            literal(Value::str("say \"hi\"\n"), Shape::String),
            r#""say \"hi\"\n".to_string()"#
        );
        assert_eq!(literal(Value::str("März"), Shape::StaticStr), "\"März\"");
        assert_eq!(literal(Value::Char('\''), Shape::Primitive(Primitive::Char)), r"'\''");
    }

    #[test]
    fn collections() {
        let shape = Shape::vec(Shape::Option(Box::new(Shape::Primitive(Primitive::U8))));
        let value = Value::Seq(vec![Value::Some(Box::new(Value::U8(1))), Value::Null]);
        assert_eq!(literal(value, shape), "vec![Some(1u8), None]");

        let map = Shape::map(MapKind::BTreeMap, Shape::StaticStr, Shape::Primitive(Primitive::I32));
        let value = Value::Map(vec![(Value::str("a"), Value::I32(1)), (Value::str("b"), Value::I32(2))]);
        assert_eq!(
            literal(value, map),
            r#"::std::collections::BTreeMap::from([("a", 1), ("b", 2)])"#
        );

        let slice = Shape::Seq {
            kind: SeqKind::StaticSlice,
            elem: Box::new(Shape::Array {
                elem: Box::new(Shape::Primitive(Primitive::U16)),
                len: 2,
            }),
        };
        let value = Value::Seq(vec![Value::Seq(vec![Value::U16(1), Value::U16(2)])]);
        assert_eq!(literal(value, slice), "&[[1u16, 2u16]]");
    }

    #[test]
    fn mismatched_values_are_rejected() {
        assert!(serialize(&Value::I64(1), &Shape::Primitive(Primitive::I32)).is_err());
        let short = Shape::Array {
            elem: Box::new(Shape::Primitive(Primitive::I32)),
            len: 3,
        };
        assert!(serialize(&Value::Seq(vec![Value::I32(1)]), &short).is_err());
    }
}
