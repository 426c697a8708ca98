//! Runtime shape descriptors.
//!
//! A [`Shape`] is derived once from the declared return type of a
//! compile-time function and then drives every later step: the return type
//! of the generated runner, decoding of the runner's output, literal
//! serialization and the kind of slot the synthesizer emits.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
    F32,
    F64,
}

impl Primitive {
    pub const ALL: [Primitive; 16] = [
        Primitive::Bool,
        Primitive::Char,
        Primitive::I8,
        Primitive::I16,
        Primitive::I32,
        Primitive::I64,
        Primitive::I128,
        Primitive::Isize,
        Primitive::U8,
        Primitive::U16,
        Primitive::U32,
        Primitive::U64,
        Primitive::U128,
        Primitive::Usize,
        Primitive::F32,
        Primitive::F64,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::I128 => "i128",
            Primitive::Isize => "isize",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::U128 => "u128",
            Primitive::Usize => "usize",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn is_integer(&self) -> bool {
        !matches!(
            self,
            Primitive::Bool | Primitive::Char | Primitive::F32 | Primitive::F64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::I16
                | Primitive::I32
                | Primitive::I64
                | Primitive::I128
                | Primitive::Isize
        )
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeqKind {
    Vec,
    VecDeque,
    /// `&'static [T]`
    StaticSlice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKind {
    HashMap,
    BTreeMap,
}

impl MapKind {
    pub fn path(&self) -> &'static str {
        match self {
            MapKind::HashMap => "::std::collections::HashMap",
            MapKind::BTreeMap => "::std::collections::BTreeMap",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Primitive(Primitive),
    String,
    StaticStr,
    Option(Box<Shape>),
    Seq { kind: SeqKind, elem: Box<Shape> },
    Array { elem: Box<Shape>, len: usize },
    Map { kind: MapKind, key: Box<Shape>, value: Box<Shape> },
}

impl Shape {
    pub fn vec(elem: Shape) -> Self {
        Shape::Seq {
            kind: SeqKind::Vec,
            elem: Box::new(elem),
        }
    }

    pub fn map(kind: MapKind, key: Shape, value: Shape) -> Self {
        Shape::Map {
            kind,
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Fully qualified Rust spelling, usable in generated code regardless of
    /// the imports in scope.
    pub fn rust_type(&self) -> String {
        match self {
            Shape::Primitive(p) => p.name().to_string(),
            Shape::String => "::std::string::String".to_string(),
            Shape::StaticStr => "&'static str".to_string(),
            Shape::Option(inner) => format!("::std::option::Option<{}>", inner.rust_type()),
            Shape::Seq { kind, elem } => match kind {
                SeqKind::Vec => format!("::std::vec::Vec<{}>", elem.rust_type()),
                SeqKind::VecDeque => {
                    format!("::std::collections::VecDeque<{}>", elem.rust_type())
                }
                SeqKind::StaticSlice => format!("&'static [{}]", elem.rust_type()),
            },
            Shape::Array { elem, len } => format!("[{}; {}]", elem.rust_type(), len),
            Shape::Map { kind, key, value } => {
                format!("{}<{}, {}>", kind.path(), key.rust_type(), value.rust_type())
            }
        }
    }

    /// Whether a literal of this shape is a constant expression, so the
    /// cached slot can be a `const` rather than a lazily initialised static.
    pub fn is_const_constructible(&self) -> bool {
        match self {
            Shape::Primitive(_) | Shape::StaticStr => true,
            Shape::String => false,
            Shape::Option(inner) => inner.is_const_constructible(),
            Shape::Seq { kind, elem } => {
                *kind == SeqKind::StaticSlice && elem.is_const_constructible()
            }
            Shape::Array { elem, .. } => elem.is_const_constructible(),
            Shape::Map { .. } => false,
        }
    }

    /// Map keys must hash and order deterministically.
    pub fn is_key(&self) -> bool {
        match self {
            Shape::Primitive(p) => !p.is_float(),
            Shape::String | Shape::StaticStr => true,
            _ => false,
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rust_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rust_type_is_fully_qualified() {
        let shape = Shape::map(
            MapKind::HashMap,
            Shape::String,
            Shape::vec(Shape::Primitive(Primitive::U8)),
        );
        assert_eq!(
            shape.rust_type(),
            "::std::collections::HashMap<::std::string::String, ::std::vec::Vec<u8>>"
        );
    }

    #[test]
    fn slot_kind_follows_constness() {
        assert!(Shape::Primitive(Primitive::F64).is_const_constructible());
        assert!(Shape::Option(Box::new(Shape::StaticStr)).is_const_constructible());
        assert!(!Shape::vec(Shape::Primitive(Primitive::I32)).is_const_constructible());
        assert!(Shape::Seq {
            kind: SeqKind::StaticSlice,
            elem: Box::new(Shape::Primitive(Primitive::I32)),
        }
        .is_const_constructible());
    }
}
