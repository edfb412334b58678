//! This module contains the per-routine recording state and the frames of the
//! recording stack.

use crate::{
    summary::{Context, ModificationSet, Summary},
    value::{FieldOwner, FieldType, RoutineId, Value},
};

/// The recording state of a routine.
///
/// Routines move from `Idle` to `Recording` when called, and back to `Idle`
/// when a summary is committed. A routine becomes `Recorded` once its summary
/// storage is full, and `Blacklisted` once any recording of it is interrupted.
/// `Blacklisted` is never left for the remainder of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordingState {
    Idle,
    Recording,
    Recorded,
    Blacklisted,
}

/// An in-progress recording of a single invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Recording {
    pub routine:       RoutineId,
    pub name:          String,
    pub depth:         usize,
    pub returns:       Option<FieldType>,
    pub context:       Context,
    pub modifications: ModificationSet,
}

impl Recording {
    /// Checks whether this recording belongs to the invocation of `routine`
    /// whose frame is at `depth`.
    #[must_use]
    pub fn is_for(&self, routine: RoutineId, depth: usize) -> bool {
        self.routine == routine && self.depth == depth
    }

    /// Notes that the field `name` of `owner` held `value` when read.
    ///
    /// Fields this recording has already written are not part of its
    /// precondition, as the invocation produced their values itself.
    pub fn observe_read(&mut self, owner: FieldOwner, name: &str, value: Value) {
        if self.modifications.recorded_write(owner, name).is_none() {
            self.context.add(owner, name, value);
        }
    }

    /// Folds the effects of a nested invocation, described by `summary`, into
    /// this recording.
    pub fn absorb(&mut self, summary: &Summary) {
        for (owner, name, value) in summary.context().tracked_fields() {
            self.observe_read(owner, name, value.clone());
        }
        self.modifications.merge_from(summary.modifications());
    }
}
