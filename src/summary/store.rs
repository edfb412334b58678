//! This module contains the [`Store`], which keeps a bounded number of
//! summaries for each routine.

use std::collections::HashMap;

use crate::{
    constant::DEFAULT_SUMMARY_CAPACITY,
    error::summary::{Error, Result},
    host::Host,
    summary::{context::Context, modifications::ModificationSet, Summary},
    value::{ObjectId, RoutineId, Value},
};

/// Storage for the summaries recorded for each routine.
///
/// Summaries for a routine are kept in insertion order, and lookups scan them
/// oldest first. The store never evicts: once a routine has `capacity`
/// summaries, further insertions for it fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Store {
    /// The summaries for each routine.
    summaries: HashMap<RoutineId, Vec<Summary>>,

    /// The maximum number of summaries kept per routine.
    capacity: usize,
}

impl Store {
    /// Creates a new, empty, store with [`DEFAULT_SUMMARY_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUMMARY_CAPACITY)
    }

    /// Creates a new, empty, store that keeps at most `capacity` summaries per
    /// routine.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let summaries = HashMap::new();
        Self {
            summaries,
            capacity,
        }
    }

    /// Stores a new summary for `routine`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if `routine` already has as many
    /// summaries as the store allows.
    pub fn add_summary(
        &mut self,
        routine: RoutineId,
        context: Context,
        modifications: ModificationSet,
    ) -> Result<()> {
        if !self.can_store_more(routine) {
            return Err(Error::CapacityExceeded {
                routine,
                capacity: self.capacity,
            });
        }

        self.summaries
            .entry(routine)
            .or_default()
            .push(Summary::new(context, modifications));

        Ok(())
    }

    /// Checks whether another summary can be stored for `routine`.
    #[must_use]
    pub fn can_store_more(&self, routine: RoutineId) -> bool {
        self.summaries
            .get(&routine)
            .map_or(true, |summaries| summaries.len() < self.capacity)
    }

    /// Checks whether at least one summary is stored for `routine`.
    #[must_use]
    pub fn has_summary(&self, routine: RoutineId) -> bool {
        self.summaries
            .get(&routine)
            .map_or(false, |summaries| !summaries.is_empty())
    }

    /// Gets the summaries stored for `routine`, oldest first.
    #[must_use]
    pub fn summaries(&self, routine: RoutineId) -> &[Summary] {
        self.summaries.get(&routine).map_or(&[], Vec::as_slice)
    }

    /// Finds the oldest summary for `routine` whose context matches an
    /// invocation on `callee` with `args` while `single_threaded`.
    #[must_use]
    pub fn find_match(
        &self,
        host: &impl Host,
        routine: RoutineId,
        callee: Option<ObjectId>,
        args: &[Value],
        single_threaded: bool,
    ) -> Option<&Summary> {
        self.summaries(routine)
            .iter()
            .find(|summary| summary.context().matches(host, callee, args, single_threaded))
    }

    /// Gets the maximum number of summaries kept per routine.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Gets the total number of summaries across all routines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.summaries.values().map(Vec::len).sum()
    }

    /// Checks whether the store holds no summaries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every stored summary.
    pub fn clear(&mut self) {
        self.summaries.clear();
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
