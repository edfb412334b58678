//! This module contains the primary error type for the library's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.

pub mod container;
pub mod execution;
pub mod host;
pub mod summary;

use thiserror::Error;

/// The interface result type for the library.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// All errors returned from the library interface should be members of this
/// enum. Soundness aborts are never errors: the recorder handles them
/// internally by discarding the affected recordings.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// Errors from the reference interpreter.
    #[error(transparent)]
    Execution(#[from] execution::LocatedError),

    /// Errors reported by the host while the recorder read or wrote its state.
    #[error(transparent)]
    Host(#[from] host::Error),

    /// Errors from the summary store.
    #[error(transparent)]
    Summary(#[from] summary::Error),

    /// A configured blacklist pattern could not be compiled.
    #[error("Invalid blacklist pattern: {_0}")]
    InvalidBlacklistPattern(String),

    /// An unknown error, represented as a string.
    #[error("Unknown Error: {_0:?}")]
    Other(String),
}

impl Error {
    /// Constructs an unknown error with the provided `message`.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
