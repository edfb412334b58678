//! This module contains the errors that a host interpreter may report to the
//! recorder when it is asked to read or write its state.

use thiserror::Error;

use crate::value::{FieldOwner, FieldType};

/// Errors raised by implementations of [`crate::host::Host`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("{_0} does not exist")]
    NoSuchOwner(FieldOwner),

    #[error("{owner} has no field named {field:?}")]
    NoSuchField { owner: FieldOwner, field: String },

    #[error("Cannot store {value} into a location of type {expected:?}")]
    TypeMismatch { expected: FieldType, value: String },

    #[error("No frame is available to receive a return value")]
    NoActiveFrame,
}

/// The result type for host operations.
pub type Result<T> = std::result::Result<T, Error>;
