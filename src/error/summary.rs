//! This module contains the errors produced by the summary store.

use thiserror::Error;

use crate::value::RoutineId;

/// Errors that occur when storing summaries in a
/// [`crate::summary::store::Store`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The routine already has as many summaries as the store allows.
    ///
    /// Callers are expected to check [`crate::summary::store::Store::can_store_more`]
    /// first, and to stop recording the routine once it returns `false`.
    #[error("Routine {routine} already has the maximum of {capacity} summaries")]
    CapacityExceeded { routine: RoutineId, capacity: usize },
}

/// The result type for summary store operations.
pub type Result<T> = std::result::Result<T, Error>;
