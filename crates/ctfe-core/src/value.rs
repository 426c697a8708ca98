use crate::shape::Primitive;

/// A value produced by a compile-time invocation.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Some(Box<Value>),
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    Isize(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    Usize(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Seq(Vec<Value>),
    /// Pairs in iteration order.
    Map(Vec<(Value, Value)>),
}

// Floats compare by bit pattern so NaN and signed zero survive equality checks.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Some(a), Some(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (I128(a), I128(b)) => a == b,
            (Isize(a), Isize(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (U128(a), U128(b)) => a == b,
            (Usize(a), Usize(b)) => a == b,
            (F32(a), F32(b)) => a.to_bits() == b.to_bits(),
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (Str(a), Str(b)) => a == b,
            (Seq(a), Seq(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Build an integer value of the given width from a sign and magnitude.
    /// Returns `None` when the number does not fit.
    pub fn integer(primitive: Primitive, negative: bool, magnitude: u128) -> Option<Value> {
        let signed: Option<i128> = if negative {
            if magnitude == 1u128 << 127 {
                Some(i128::MIN)
            } else {
                i128::try_from(magnitude).ok().map(|m| -m)
            }
        } else {
            i128::try_from(magnitude).ok()
        };

        let value = match primitive {
            Primitive::I8 => Value::I8(i8::try_from(signed?).ok()?),
            Primitive::I16 => Value::I16(i16::try_from(signed?).ok()?),
            Primitive::I32 => Value::I32(i32::try_from(signed?).ok()?),
            Primitive::I64 => Value::I64(i64::try_from(signed?).ok()?),
            Primitive::I128 => Value::I128(signed?),
            Primitive::Isize => Value::Isize(i64::try_from(signed?).ok()?),
            _ if negative && magnitude != 0 => return None,
            Primitive::U8 => Value::U8(u8::try_from(magnitude).ok()?),
            Primitive::U16 => Value::U16(u16::try_from(magnitude).ok()?),
            Primitive::U32 => Value::U32(u32::try_from(magnitude).ok()?),
            Primitive::U64 => Value::U64(u64::try_from(magnitude).ok()?),
            Primitive::U128 => Value::U128(magnitude),
            Primitive::Usize => Value::Usize(u64::try_from(magnitude).ok()?),
            _ => return None,
        };
        Some(value)
    }

    /// Integer content widened to `i128`, if this is an integer that fits.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::I8(v) => Some(v as i128),
            Value::I16(v) => Some(v as i128),
            Value::I32(v) => Some(v as i128),
            Value::I64(v) | Value::Isize(v) => Some(v as i128),
            Value::I128(v) => Some(v),
            Value::U8(v) => Some(v as i128),
            Value::U16(v) => Some(v as i128),
            Value::U32(v) => Some(v as i128),
            Value::U64(v) | Value::Usize(v) => Some(v as i128),
            Value::U128(v) => i128::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn primitive(&self) -> Option<Primitive> {
        Some(match self {
            Value::Bool(_) => Primitive::Bool,
            Value::Char(_) => Primitive::Char,
            Value::I8(_) => Primitive::I8,
            Value::I16(_) => Primitive::I16,
            Value::I32(_) => Primitive::I32,
            Value::I64(_) => Primitive::I64,
            Value::I128(_) => Primitive::I128,
            Value::Isize(_) => Primitive::Isize,
            Value::U8(_) => Primitive::U8,
            Value::U16(_) => Primitive::U16,
            Value::U32(_) => Primitive::U32,
            Value::U64(_) => Primitive::U64,
            Value::U128(_) => Primitive::U128,
            Value::Usize(_) => Primitive::Usize,
            Value::F32(_) => Primitive::F32,
            Value::F64(_) => Primitive::F64,
            _ => return None,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "None",
            Value::Some(_) => "Some",
            Value::Str(_) => "str",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
            other => other.primitive().map(|p| p.name()).unwrap_or("value"),
        }
    }

    /// Look a key up in a map value.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Seq(items) => Some(items.len()),
            Value::Map(pairs) => Some(pairs.len()),
            Value::Str(s) => Some(s.chars().count()),
            _ => None,
        }
    }

    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_respects_width() {
        assert_eq!(Value::integer(Primitive::I8, true, 128), Some(Value::I8(-128)));
        assert_eq!(Value::integer(Primitive::I8, false, 128), None);
        assert_eq!(Value::integer(Primitive::U8, true, 1), None);
        assert_eq!(
            Value::integer(Primitive::I128, true, 1u128 << 127),
            Some(Value::I128(i128::MIN))
        );
        assert_eq!(Value::integer(Primitive::F64, false, 1), None);
    }

    #[test]
    fn nan_equals_itself_structurally() {
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
        assert_ne!(Value::F64(0.0), Value::F64(-0.0));
    }
}
