//! This module contains errors pertaining to the execution of programs by the
//! reference interpreter.

use thiserror::Error;

use crate::{
    error::{container, host},
    value::{ClassId, FieldType, RoutineId},
};

/// Errors that occur during execution by the [`crate::vm::VM`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Instruction pointer {requested:?} is out of bounds in code of length {available:?}")]
    InstructionPointerOutOfBounds { requested: usize, available: usize },

    #[error("Maximum call depth of {limit:?} frames exceeded")]
    CallDepthExceeded { limit: usize },

    #[error("Instruction limit of {limit:?} exceeded")]
    InstructionLimitExceeded { limit: usize },

    #[error("The operand stack was empty")]
    StackUnderflow,

    #[error("No local variable exists at index {index:?}")]
    NoSuchLocal { index: u16 },

    #[error("No routine exists for {_0}")]
    NoSuchRoutine(RoutineId),

    #[error("No class exists for {_0}")]
    NoSuchClass(ClassId),

    #[error("No native routine is named {_0:?}")]
    UnknownNative(String),

    #[error("No routine is named {_0:?}")]
    UnknownRoutineName(String),

    #[error("Routine {routine} expects {expected:?} arguments but received {received:?}")]
    ArityMismatch {
        routine:  RoutineId,
        expected: usize,
        received: usize,
    },

    #[error("Instance routine {_0} was invoked without a receiver")]
    MissingReceiver(RoutineId),

    #[error("Expected an operand of type {expected:?} but found {found}")]
    OperandType { expected: FieldType, found: String },

    #[error("Arithmetic operands {left} and {right} are not compatible")]
    IncompatibleOperands { left: String, right: String },

    #[error("Index {index:?} is out of bounds for an array of length {length:?}")]
    ArrayIndexOutOfBounds { index: i32, length: usize },

    #[error("Routine {_0} has no return instruction")]
    NoReturnInstruction(RoutineId),

    #[error("An exception was thrown and not caught")]
    UncaughtException,

    #[error("Execution was stopped by the watchdog")]
    StoppedByWatchdog,

    #[error(transparent)]
    Host(#[from] host::Error),

    #[error("The recorder failed: {_0}")]
    Recorder(String),
}

/// An execution error with an associated location in the program.
pub type LocatedError = container::Located<Error>;

/// The result type for methods that may have execution errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, location: container::Location) -> Self::Located {
        container::Located {
            location,
            payload: self,
        }
    }
}
