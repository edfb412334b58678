//! This module contains the events that a host interpreter delivers to the
//! [`crate::recorder::Recorder`], and the directives it answers with.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::value::{FieldOwner, FieldType, ObjectId, RoutineId, Value};

/// The way in which a routine is dispatched.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoutineKind {
    /// A routine without a callee object.
    Static,

    /// A routine invoked on a callee object.
    Instance,

    /// An object constructor. Constructors initialize freshly allocated
    /// objects and are never summarized.
    Constructor,

    /// A class initializer. These run at most once per class and are never
    /// summarized.
    ClassInitializer,
}

impl RoutineKind {
    /// Checks whether routines of this kind can ever be summarized.
    #[must_use]
    pub fn is_summarizable(self) -> bool {
        matches!(self, Self::Static | Self::Instance)
    }
}

/// A single call of a routine, as observed by the host when the callee's frame
/// has been set up but before its first instruction executes.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// The identity of the routine being called.
    pub routine: RoutineId,

    /// The fully-qualified name of the routine.
    pub name: String,

    /// How the routine is dispatched.
    pub kind: RoutineKind,

    /// The object the routine is invoked on, for instance routines.
    pub callee: Option<ObjectId>,

    /// The argument values, excluding the callee.
    pub args: Vec<Value>,

    /// The declared parameter types, excluding the callee.
    pub params: Vec<FieldType>,

    /// The declared return type, or [`None`] for routines that return nothing.
    pub returns: Option<FieldType>,

    /// The depth of the callee's frame on the host's call stack.
    pub depth: usize,

    /// The number of instructions in the routine's body.
    pub instruction_count: usize,
}

impl Invocation {
    /// Checks whether any parameter, or the return type, is an array.
    #[must_use]
    pub fn has_array_signature(&self) -> bool {
        self.params
            .iter()
            .chain(self.returns.iter())
            .any(|tp| !tp.is_snapshottable())
    }
}

/// An access to a field made by an executed instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldAccess {
    /// The object or class that owns the field.
    pub owner: FieldOwner,

    /// The name of the field.
    pub field: String,

    /// The declared type of the field.
    pub tp: FieldType,

    /// The value read from the field, or the value written to it.
    pub value: Value,
}

/// Notifications of host behaviour that the recorder cannot observe the
/// effects of, and that hence always interrupt recording.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Interruption {
    ThreadInterrupted,
    ObjectLocked,
    ObjectUnlocked,
    ObjectWait,
    ObjectNotify,
    ObjectNotifyAll,
    ObjectShared,
    ObjectExposed,
    ChoiceRegistered,
    ChoiceSet,
    ChoiceAdvanced,
    ExceptionThrown,
    StateAdvanced,
    StateBacktracked,
}

impl Display for Interruption {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::ThreadInterrupted => "thread interrupted",
            Self::ObjectLocked => "object locked",
            Self::ObjectUnlocked => "object unlocked",
            Self::ObjectWait => "wait",
            Self::ObjectNotify => "notify",
            Self::ObjectNotifyAll => "notify all",
            Self::ObjectShared => "object shared",
            Self::ObjectExposed => "object exposed",
            Self::ChoiceRegistered => "choice registered",
            Self::ChoiceSet => "choice set",
            Self::ChoiceAdvanced => "choice advanced",
            Self::ExceptionThrown => "exception thrown",
            Self::StateAdvanced => "state advanced",
            Self::StateBacktracked => "state backtracked",
        };
        write!(f, "{text}")
    }
}

/// An event delivered by the host as it executes instructions.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A routine was called.
    Call(Invocation),

    /// The routine whose frame sits at `depth` returned `value`.
    Return {
        routine: RoutineId,
        depth:   usize,
        value:   Option<Value>,
    },

    /// A field was read.
    FieldRead(FieldAccess),

    /// A field was written.
    FieldWrite(FieldAccess),

    /// A native routine named `name` was executed.
    NativeCall { name: String },

    /// A new object was allocated.
    Allocation,

    /// An element of an array was read or written.
    ArrayAccess,

    /// Something happened whose effects cannot be observed.
    Interruption(Interruption),
}

/// The recorder's answer to an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Directive {
    /// Continue executing normally.
    Continue,

    /// The call's effects have been applied and its return value pushed onto
    /// the callee's evaluation stack, so the host must skip straight to the
    /// callee's return instruction.
    SkipToReturn,
}

#[cfg(test)]
mod test {
    use crate::{
        recorder::event::{Invocation, RoutineKind},
        value::{FieldType, RoutineId},
    };

    fn invocation(params: Vec<FieldType>, returns: Option<FieldType>) -> Invocation {
        Invocation {
            routine: RoutineId(0),
            name: "Example.f".into(),
            kind: RoutineKind::Static,
            callee: None,
            args: vec![],
            params,
            returns,
            depth: 1,
            instruction_count: 4,
        }
    }

    #[test]
    fn detects_array_signatures() {
        assert!(!invocation(vec![FieldType::Int], Some(FieldType::Reference)).has_array_signature());
        assert!(invocation(vec![FieldType::Array], None).has_array_signature());
        assert!(invocation(vec![], Some(FieldType::Array)).has_array_signature());
    }

    #[test]
    fn only_plain_routines_are_summarizable() {
        assert!(RoutineKind::Static.is_summarizable());
        assert!(RoutineKind::Instance.is_summarizable());
        assert!(!RoutineKind::Constructor.is_summarizable());
        assert!(!RoutineKind::ClassInitializer.is_summarizable());
    }
}
