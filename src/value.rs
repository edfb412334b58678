//! This module contains the value snapshots captured by the recorder, along
//! with the opaque identity handles through which the host refers to its
//! objects, classes and routines.

use std::{
    fmt::{Display, Formatter},
    hash::{Hash, Hasher},
};

use derivative::Derivative;
use serde::Serialize;

/// An opaque handle for an object living in the host interpreter's heap.
///
/// Two handles denote the same object if and only if they are equal.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ObjectId(pub u32);

/// An opaque handle for a class known to the host interpreter.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ClassId(pub u32);

/// An opaque handle identifying a routine independently of any particular
/// invocation of it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RoutineId(pub u32);

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl Display for ClassId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

impl Display for RoutineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "routine#{}", self.0)
    }
}

/// The owner of a field: an object for instance fields, or a class for static
/// fields.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FieldOwner {
    Object(ObjectId),
    Class(ClassId),
}

impl Display for FieldOwner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(id) => write!(f, "{id}"),
            Self::Class(id) => write!(f, "{id}"),
        }
    }
}

/// The declared type of a field, parameter or return value.
///
/// Dispatch over this type when writing values into the host is always an
/// exhaustive match.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FieldType {
    Int,
    Long,
    Float,
    Double,
    Short,
    Byte,
    Char,
    Bool,
    Reference,
    Array,
}

impl FieldType {
    /// Checks whether values of this type can be captured in a snapshot.
    ///
    /// Arrays are mutable aggregates whose contents are not tracked, so they
    /// can never be part of a summary.
    #[must_use]
    pub fn is_snapshottable(self) -> bool {
        !matches!(self, Self::Array)
    }

    /// Gets the value that a field of this type holds before it is first
    /// written.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Int => Value::Int(0),
            Self::Long => Value::Long(0),
            Self::Float => Value::Float(0.0),
            Self::Double => Value::Double(0.0),
            Self::Short => Value::Short(0),
            Self::Byte => Value::Byte(0),
            Self::Char => Value::Char(0),
            Self::Bool => Value::Bool(false),
            Self::Reference | Self::Array => Value::Null,
        }
    }
}

/// A snapshot of a single value.
///
/// # Equality
///
/// - Scalars are equal when their values are equal. Floating point values are
///   compared by their bit patterns, so `NaN` equals an identical `NaN` while
///   `0.0` and `-0.0` are distinct.
/// - Strings are equal when their contents are equal, regardless of which
///   string object held them.
/// - Objects are equal only when they are the very same object.
#[derive(Clone, Debug, Derivative)]
#[derivative(Eq, Hash, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(
        #[derivative(
            PartialEq(compare_with = "float_bits_eq"),
            Hash(hash_with = "hash_float_bits")
        )]
        f32,
    ),
    Double(
        #[derivative(
            PartialEq(compare_with = "double_bits_eq"),
            Hash(hash_with = "hash_double_bits")
        )]
        f64,
    ),
    Short(i16),
    Byte(i8),
    Char(u16),
    Bool(bool),
    Str(String),
    Object(ObjectId),
    Null,
}

impl Value {
    /// Constructs a string value from `content`.
    #[must_use]
    pub fn string(content: impl Into<String>) -> Self {
        Self::Str(content.into())
    }

    /// Checks whether this value may be stored in a location of type `tp`.
    #[must_use]
    pub fn conforms_to(&self, tp: FieldType) -> bool {
        matches!(
            (tp, self),
            (FieldType::Int, Self::Int(_))
                | (FieldType::Long, Self::Long(_))
                | (FieldType::Float, Self::Float(_))
                | (FieldType::Double, Self::Double(_))
                | (FieldType::Short, Self::Short(_))
                | (FieldType::Byte, Self::Byte(_))
                | (FieldType::Char, Self::Char(_))
                | (FieldType::Bool, Self::Bool(_))
                | (FieldType::Reference, Self::Str(_) | Self::Object(_) | Self::Null)
                | (FieldType::Array, Self::Object(_) | Self::Null)
        )
    }

    /// Gets the object identity held by this value, if any.
    #[must_use]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Gets the representation of this value on an interpreter's evaluation
    /// stack, where `short`, `byte`, `char` and `boolean` values are `int`s.
    #[must_use]
    pub fn widened(&self) -> Value {
        match self {
            Self::Short(v) => Self::Int(i32::from(*v)),
            Self::Byte(v) => Self::Int(i32::from(*v)),
            Self::Char(v) => Self::Int(i32::from(*v)),
            Self::Bool(v) => Self::Int(i32::from(*v)),
            other => other.clone(),
        }
    }

    /// Converts a stack value into a value that may be stored in a location of
    /// type `tp`, truncating `int`s for the narrower integral types.
    ///
    /// Returns [`None`] if no such conversion exists.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn narrowed_to(&self, tp: FieldType) -> Option<Value> {
        match (tp, self) {
            (FieldType::Short, Self::Int(v)) => Some(Self::Short(*v as i16)),
            (FieldType::Byte, Self::Int(v)) => Some(Self::Byte(*v as i8)),
            (FieldType::Char, Self::Int(v)) => Some(Self::Char(*v as u16)),
            (FieldType::Bool, Self::Int(v)) => Some(Self::Bool(*v != 0)),
            (tp, value) if value.conforms_to(tp) => Some(value.clone()),
            _ => None,
        }
    }

    /// Widens small integral values to an `i64`, as the interpreter does for
    /// arithmetic.
    #[must_use]
    pub fn as_integral(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Char(v) => Some(i64::from(*v)),
            Self::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(v) => write!(f, "{v}d"),
            Self::Short(v) => write!(f, "{v}s"),
            Self::Byte(v) => write!(f, "{v}b"),
            Self::Char(v) => write!(f, "'\\u{v:04x}'"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Object(id) => write!(f, "{id}"),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Self::Object(value)
    }
}

fn float_bits_eq(a: &f32, b: &f32) -> bool {
    a.to_bits() == b.to_bits()
}

fn double_bits_eq(a: &f64, b: &f64) -> bool {
    a.to_bits() == b.to_bits()
}

fn hash_float_bits<H: Hasher>(value: &f32, state: &mut H) {
    value.to_bits().hash(state);
}

fn hash_double_bits<H: Hasher>(value: &f64, state: &mut H) {
    value.to_bits().hash(state);
}
