//! Text encoding of runner results.
//!
//! The runner prints one line starting with [`VALUE_PREFIX`]. Each value is a
//! tag character followed by a token and a space:
//!
//! | tag | value |
//! |-----|-------|
//! | `i` | integer in decimal |
//! | `f` / `d` | `f32` / `f64` bit pattern in hex |
//! | `b` | `1` or `0` |
//! | `c` | unicode scalar value |
//! | `s` | `<byte len>:<bytes>` |
//! | `n` / `o` | `None` / `Some`, followed by the inner value |
//! | `[` | element count, followed by the elements |
//! | `{` | pair count, followed by key and value of every pair |
//!
//! `HashMap` pairs are written sorted by their encoded key so the generated
//! literal does not depend on the hasher's iteration order.

use ctfe_core::shape::{Primitive, Shape};
use ctfe_core::value::Value;

use crate::error::{EvalError, Result};

pub const VALUE_PREFIX: &str = "__CTFE_VALUE__ ";

/// Support module compiled into every runner.
pub const SUPPORT_SOURCE: &str = r#"
mod __ctfe_wire {
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::fmt::Write;

    pub trait Emit {
        fn encode(&self, out: &mut String);
    }

    macro_rules! integers {
        ($($t:ty),*) => {
            $(impl Emit for $t {
                fn encode(&self, out: &mut String) {
                    let _ = write!(out, "i{} ", self);
                }
            })*
        };
    }
    integers!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

    impl Emit for f32 {
        fn encode(&self, out: &mut String) {
            let _ = write!(out, "f{:08x} ", self.to_bits());
        }
    }

    impl Emit for f64 {
        fn encode(&self, out: &mut String) {
            let _ = write!(out, "d{:016x} ", self.to_bits());
        }
    }

    impl Emit for bool {
        fn encode(&self, out: &mut String) {
            out.push_str(if *self { "b1 " } else { "b0 " });
        }
    }

    impl Emit for char {
        fn encode(&self, out: &mut String) {
            let _ = write!(out, "c{} ", *self as u32);
        }
    }

    impl Emit for str {
        fn encode(&self, out: &mut String) {
            let _ = write!(out, "s{}:", self.len());
            out.push_str(self);
            out.push(' ');
        }
    }

    impl Emit for String {
        fn encode(&self, out: &mut String) {
            self.as_str().encode(out)
        }
    }

    impl<T: Emit + ?Sized> Emit for &T {
        fn encode(&self, out: &mut String) {
            (**self).encode(out)
        }
    }

    impl<T: Emit> Emit for Option<T> {
        fn encode(&self, out: &mut String) {
            match self {
                None => out.push_str("n "),
                Some(value) => {
                    out.push_str("o ");
                    value.encode(out);
                }
            }
        }
    }

    impl<T: Emit> Emit for [T] {
        fn encode(&self, out: &mut String) {
            let _ = write!(out, "[{} ", self.len());
            for item in self {
                item.encode(out);
            }
        }
    }

    impl<T: Emit, const N: usize> Emit for [T; N] {
        fn encode(&self, out: &mut String) {
            self.as_slice().encode(out)
        }
    }

    impl<T: Emit> Emit for Vec<T> {
        fn encode(&self, out: &mut String) {
            self.as_slice().encode(out)
        }
    }

    impl<T: Emit> Emit for VecDeque<T> {
        fn encode(&self, out: &mut String) {
            let _ = write!(out, "[{} ", self.len());
            for item in self {
                item.encode(out);
            }
        }
    }

    impl<K: Emit, V: Emit> Emit for BTreeMap<K, V> {
        fn encode(&self, out: &mut String) {
            let _ = write!(out, "{{{} ", self.len());
            for (key, value) in self {
                key.encode(out);
                value.encode(out);
            }
        }
    }

    impl<K: Emit, V: Emit, S> Emit for HashMap<K, V, S> {
        fn encode(&self, out: &mut String) {
            let mut pairs: Vec<(String, String)> = self
                .iter()
                .map(|(key, value)| {
                    let mut k = String::new();
                    key.encode(&mut k);
                    let mut v = String::new();
                    value.encode(&mut v);
                    (k, v)
                })
                .collect();
            pairs.sort();
            let _ = write!(out, "{{{} ", pairs.len());
            for (key, value) in pairs {
                out.push_str(&key);
                out.push_str(&value);
            }
        }
    }

    pub fn emit<T: Emit + ?Sized>(value: &T) {
        let mut out = String::new();
        value.encode(&mut out);
        println!("__CTFE_VALUE__ {}", out);
    }
}
"#;

/// Decode the value line printed by a runner.
///
/// The function under evaluation may print to stdout itself, and encoded
/// strings may span lines, so candidates are tried from the last marker
/// backwards and the first one that decodes to the end of output wins.
pub fn decode_output(stdout: &str, shape: &Shape) -> Result<Value> {
    let starts: Vec<usize> = stdout
        .match_indices(VALUE_PREFIX)
        .map(|(index, _)| index)
        .filter(|index| *index == 0 || stdout.as_bytes()[index - 1] == b'\n')
        .collect();
    if starts.is_empty() {
        return Err(EvalError::Decode(
            "the invocation produced no value".to_string(),
        ));
    }

    let mut first_error = None;
    for start in starts.into_iter().rev() {
        let body = &stdout[start + VALUE_PREFIX.len()..];
        let mut reader = Reader::new(body);
        match reader.value(shape) {
            Ok(value) if reader.rest().trim_end_matches(['\r', '\n']).is_empty() => {
                return Ok(value)
            }
            Ok(_) => {
                first_error.get_or_insert_with(|| "trailing output after the value".to_string());
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    Err(EvalError::Decode(format!(
        "cannot decode the result as `{}`: {}",
        shape,
        first_error.unwrap_or_default()
    )))
}

struct Reader<'a> {
    input: &'a str,
    pos: usize,
}

type Step<T> = std::result::Result<T, String>;

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn tag(&mut self, expected: &[char]) -> Step<char> {
        let c = self
            .rest()
            .chars()
            .next()
            .ok_or_else(|| "unexpected end of output".to_string())?;
        if !expected.contains(&c) {
            return Err(format!("unexpected `{}` at offset {}", c, self.pos));
        }
        self.pos += c.len_utf8();
        Ok(c)
    }

    fn token(&mut self) -> Step<&'a str> {
        let rest = self.rest();
        let end = rest
            .find(' ')
            .ok_or_else(|| "unterminated token".to_string())?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn count(&mut self) -> Step<usize> {
        let token = self.token()?;
        token
            .parse()
            .map_err(|_| format!("invalid length `{}`", token))
    }

    fn value(&mut self, shape: &Shape) -> Step<Value> {
        match shape {
            Shape::Primitive(p) => self.primitive(*p),
            Shape::String | Shape::StaticStr => self.string().map(Value::Str),
            Shape::Option(inner) => match self.tag(&['n', 'o'])? {
                'n' => {
                    self.token()?;
                    Ok(Value::Null)
                }
                _ => {
                    self.token()?;
                    Ok(Value::Some(Box::new(self.value(inner)?)))
                }
            },
            Shape::Seq { elem, .. } => {
                self.tag(&['['])?;
                let n = self.count()?;
                self.items(n, elem).map(Value::Seq)
            }
            Shape::Array { elem, len } => {
                self.tag(&['['])?;
                let n = self.count()?;
                if n != *len {
                    return Err(format!("expected {} elements but found {}", len, n));
                }
                self.items(n, elem).map(Value::Seq)
            }
            Shape::Map { key, value, .. } => {
                self.tag(&['{'])?;
                let n = self.count()?;
                let mut pairs = Vec::with_capacity(n);
                for _ in 0..n {
                    let k = self.value(key)?;
                    let v = self.value(value)?;
                    pairs.push((k, v));
                }
                Ok(Value::Map(pairs))
            }
        }
    }

    fn items(&mut self, n: usize, elem: &Shape) -> Step<Vec<Value>> {
        (0..n).map(|_| self.value(elem)).collect()
    }

    fn string(&mut self) -> Step<String> {
        self.tag(&['s'])?;
        let rest = self.rest();
        let colon = rest
            .find(':')
            .ok_or_else(|| "unterminated string length".to_string())?;
        let len: usize = rest[..colon]
            .parse()
            .map_err(|_| format!("invalid string length `{}`", &rest[..colon]))?;
        let start = colon + 1;
        let text = rest
            .get(start..start + len)
            .ok_or_else(|| "string extends past the end of output".to_string())?;
        if !rest[start + len..].starts_with(' ') {
            return Err("unterminated string".to_string());
        }
        self.pos += start + len + 1;
        Ok(text.to_string())
    }

    fn primitive(&mut self, primitive: Primitive) -> Step<Value> {
        match primitive {
            Primitive::Bool => {
                self.tag(&['b'])?;
                match self.token()? {
                    "1" => Ok(Value::Bool(true)),
                    "0" => Ok(Value::Bool(false)),
                    other => Err(format!("invalid bool `{}`", other)),
                }
            }
            Primitive::Char => {
                self.tag(&['c'])?;
                let token = self.token()?;
                token
                    .parse::<u32>()
                    .ok()
                    .and_then(char::from_u32)
                    .map(Value::Char)
                    .ok_or_else(|| format!("invalid char `{}`", token))
            }
            Primitive::F32 => {
                self.tag(&['f'])?;
                let token = self.token()?;
                u32::from_str_radix(token, 16)
                    .map(|bits| Value::F32(canonical_f32(f32::from_bits(bits))))
                    .map_err(|_| format!("invalid f32 bits `{}`", token))
            }
            Primitive::F64 => {
                self.tag(&['d'])?;
                let token = self.token()?;
                u64::from_str_radix(token, 16)
                    .map(|bits| Value::F64(canonical_f64(f64::from_bits(bits))))
                    .map_err(|_| format!("invalid f64 bits `{}`", token))
            }
            integer => {
                self.tag(&['i'])?;
                let token = self.token()?;
                let (negative, digits) = match token.strip_prefix('-') {
                    Some(digits) => (true, digits),
                    None => (false, token),
                };
                let magnitude: u128 = digits
                    .parse()
                    .map_err(|_| format!("invalid integer `{}`", token))?;
                Value::integer(integer, negative, magnitude)
                    .ok_or_else(|| format!("`{}` does not fit in `{}`", token, integer))
            }
        }
    }
}

/// Every NaN is written back as `NAN`, whatever its sign or payload.
fn canonical_f32(v: f32) -> f32 {
    if v.is_nan() {
        f32::NAN
    } else {
        v
    }
}

fn canonical_f64(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::shape::MapKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_nested_values() {
        let shape = Shape::map(
            MapKind::BTreeMap,
            Shape::String,
            Shape::vec(Shape::Option(Box::new(Shape::Primitive(Primitive::I8)))),
        );
        let out = "__CTFE_VALUE__ {2 s1:a [2 o i-3 n s2:b  [0 \n";
        let value = decode_output(out, &shape).unwrap();
        assert_eq!(
            value,
            Value::Map(vec![
                (
                    Value::str("a"),
                    Value::Seq(vec![Value::Some(Box::new(Value::I8(-3))), Value::Null])
                ),
                (Value::str("b "), Value::Seq(vec![])),
            ])
        );
    }

    #[test]
    fn floats_keep_their_bits() {
        let out = format!("__CTFE_VALUE__ d{:016x} \n", f64::NAN.to_bits());
        let value = decode_output(&out, &Shape::Primitive(Primitive::F64)).unwrap();
        assert_eq!(value, Value::F64(f64::NAN));
        let out = format!("__CTFE_VALUE__ f{:08x} \n", 0.1f32.to_bits());
        let value = decode_output(&out, &Shape::Primitive(Primitive::F32)).unwrap();
        assert_eq!(value, Value::F32(0.1));
    }

    #[test]
    fn any_nan_decodes_to_the_canonical_nan() {
        let negative = -f64::NAN;
        let payload = f64::from_bits(0x7ff8_0000_0000_0001);
        for nan in [negative, payload] {
            let out = format!("__CTFE_VALUE__ d{:016x} \n", nan.to_bits());
            let value = decode_output(&out, &Shape::Primitive(Primitive::F64)).unwrap();
            assert_eq!(value, Value::F64(f64::NAN));
        }
        let out = format!("__CTFE_VALUE__ f{:08x} \n", (-f32::NAN).to_bits());
        let value = decode_output(&out, &Shape::Primitive(Primitive::F32)).unwrap();
        assert_eq!(value, Value::F32(f32::NAN));
        let out = format!("__CTFE_VALUE__ d{:016x} \n", (-0.0f64).to_bits());
        let value = decode_output(&out, &Shape::Primitive(Primitive::F64)).unwrap();
        assert_eq!(value, Value::F64(-0.0));
    }

    #[test]
    fn program_output_before_the_value_is_ignored() {
        let out = "hello\n__CTFE_VALUE__ s26:__CTFE_VALUE__ in a string \n";
        let value = decode_output(out, &Shape::String).unwrap();
        assert_eq!(value, Value::str("__CTFE_VALUE__ in a string"));
    }

    #[test]
    fn shape_mismatch_is_a_decode_error() {
        let out = "__CTFE_VALUE__ i300 \n";
        let err = decode_output(out, &Shape::Primitive(Primitive::U8)).unwrap_err();
        assert!(matches!(err, EvalError::Decode(_)));
        assert!(decode_output("", &Shape::Primitive(Primitive::U8)).is_err());
    }
}
