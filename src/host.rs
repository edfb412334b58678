//! This module contains the interface that a host interpreter presents to the
//! recorder.
//!
//! The recorder never owns any of the interpreted program's state. Everything
//! it needs to know about that state at match time, and everything it needs to
//! change at replay time, goes through the [`Host`] trait.

use crate::{
    error::host::{Error, Result},
    value::{FieldOwner, FieldType, Value},
};

/// The operations that a host interpreter provides to the recorder.
///
/// # Typed Access
///
/// Writes into the host are split by type so that the host can use its own
/// typed storage primitives. The recorder dispatches to these with an
/// exhaustive match over [`FieldType`], so implementors never need to inspect
/// type tags themselves.
///
/// # Return Values
///
/// Following the convention of stack-based interpreters, `short`, `byte`,
/// `char` and `boolean` return values are pushed as `int`s.
pub trait Host {
    /// Reads the current value of the field named `field` on `owner`.
    ///
    /// Returns [`None`] if the owner or the field does not exist.
    #[must_use]
    fn field(&self, owner: FieldOwner, field: &str) -> Option<Value>;

    /// Checks whether `owner` is reachable from more than one thread.
    #[must_use]
    fn is_shared(&self, owner: FieldOwner) -> bool;

    /// Checks whether the fields of `owner` currently cannot be mutated.
    #[must_use]
    fn is_frozen(&self, owner: FieldOwner) -> bool;

    /// Checks whether the interpreted program currently has exactly one
    /// runnable thread.
    #[must_use]
    fn is_single_threaded(&self) -> bool;

    /// Stores an `int` into the field named `field` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist.
    fn set_int_field(&mut self, owner: FieldOwner, field: &str, value: i32) -> Result<()>;

    /// Stores a `long` into the field named `field` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist.
    fn set_long_field(&mut self, owner: FieldOwner, field: &str, value: i64) -> Result<()>;

    /// Stores a `float` into the field named `field` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist.
    fn set_float_field(&mut self, owner: FieldOwner, field: &str, value: f32) -> Result<()>;

    /// Stores a `double` into the field named `field` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist.
    fn set_double_field(&mut self, owner: FieldOwner, field: &str, value: f64) -> Result<()>;

    /// Stores a `short` into the field named `field` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist.
    fn set_short_field(&mut self, owner: FieldOwner, field: &str, value: i16) -> Result<()>;

    /// Stores a `byte` into the field named `field` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist.
    fn set_byte_field(&mut self, owner: FieldOwner, field: &str, value: i8) -> Result<()>;

    /// Stores a `char` into the field named `field` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist.
    fn set_char_field(&mut self, owner: FieldOwner, field: &str, value: u16) -> Result<()>;

    /// Stores a `boolean` into the field named `field` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist.
    fn set_bool_field(&mut self, owner: FieldOwner, field: &str, value: bool) -> Result<()>;

    /// Stores a reference into the field named `field` on `owner`.
    ///
    /// The `value` is one of [`Value::Object`], [`Value::Str`] or
    /// [`Value::Null`]. Hosts that represent strings as objects are
    /// responsible for materializing string values.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the owner or field does not exist, or if `value` is
    /// not a reference.
    fn set_reference_field(&mut self, owner: FieldOwner, field: &str, value: &Value)
        -> Result<()>;

    /// Pushes an `int` onto the evaluation stack of the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no frame to push onto.
    fn push_int(&mut self, value: i32) -> Result<()>;

    /// Pushes a `long` onto the evaluation stack of the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no frame to push onto.
    fn push_long(&mut self, value: i64) -> Result<()>;

    /// Pushes a `float` onto the evaluation stack of the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no frame to push onto.
    fn push_float(&mut self, value: f32) -> Result<()>;

    /// Pushes a `double` onto the evaluation stack of the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no frame to push onto.
    fn push_double(&mut self, value: f64) -> Result<()>;

    /// Pushes a reference onto the evaluation stack of the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if there is no frame to push onto.
    fn push_reference(&mut self, value: &Value) -> Result<()>;
}

/// Writes `value` into the field named `field` on `owner` through the typed
/// setter that corresponds to `tp`.
///
/// # Errors
///
/// Returns [`Err`] if `value` does not conform to `tp`, or if the host rejects
/// the write.
pub fn write_field(
    host: &mut impl Host,
    owner: FieldOwner,
    field: &str,
    tp: FieldType,
    value: &Value,
) -> Result<()> {
    match (tp, value) {
        (FieldType::Int, Value::Int(v)) => host.set_int_field(owner, field, *v),
        (FieldType::Long, Value::Long(v)) => host.set_long_field(owner, field, *v),
        (FieldType::Float, Value::Float(v)) => host.set_float_field(owner, field, *v),
        (FieldType::Double, Value::Double(v)) => host.set_double_field(owner, field, *v),
        (FieldType::Short, Value::Short(v)) => host.set_short_field(owner, field, *v),
        (FieldType::Byte, Value::Byte(v)) => host.set_byte_field(owner, field, *v),
        (FieldType::Char, Value::Char(v)) => host.set_char_field(owner, field, *v),
        (FieldType::Bool, Value::Bool(v)) => host.set_bool_field(owner, field, *v),
        (FieldType::Reference, Value::Object(_) | Value::Str(_) | Value::Null) => {
            host.set_reference_field(owner, field, value)
        }
        (expected, value) => Err(Error::TypeMismatch {
            expected,
            value: value.to_string(),
        }),
    }
}

/// Pushes `value`, declared as being of type `tp`, onto the host's evaluation
/// stack using the typed return convention.
///
/// # Errors
///
/// Returns [`Err`] if `value` does not conform to `tp`, or if the host has no
/// frame to push onto.
pub fn push_return(host: &mut impl Host, tp: FieldType, value: &Value) -> Result<()> {
    match (tp, value) {
        (FieldType::Int, Value::Int(v)) => host.push_int(*v),
        (FieldType::Short, Value::Short(v)) => host.push_int(i32::from(*v)),
        (FieldType::Byte, Value::Byte(v)) => host.push_int(i32::from(*v)),
        (FieldType::Char, Value::Char(v)) => host.push_int(i32::from(*v)),
        (FieldType::Bool, Value::Bool(v)) => host.push_int(i32::from(*v)),
        (FieldType::Long, Value::Long(v)) => host.push_long(*v),
        (FieldType::Float, Value::Float(v)) => host.push_float(*v),
        (FieldType::Double, Value::Double(v)) => host.push_double(*v),
        (FieldType::Reference, Value::Object(_) | Value::Str(_) | Value::Null) => {
            host.push_reference(value)
        }
        (expected, value) => Err(Error::TypeMismatch {
            expected,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod test_host;
