//! This module contains the instruction set of the reference interpreter.
//!
//! The interpreter is stack based. Each routine invocation has its own frame
//! holding an array of local variables and an operand stack. Values on the
//! operand stack are always widened (see [`Value::widened`]), and are narrowed
//! again when stored into fields or returned.

use crate::value::{ClassId, FieldType, RoutineId, Value};

/// A single instruction of the reference interpreter.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Pushes a constant.
    Push(Value),

    /// Pushes the local variable at the given index.
    Load(u16),

    /// Pops the top of the stack into the local variable at the given index.
    Store(u16),

    /// Discards the top of the stack.
    Pop,

    /// Duplicates the top of the stack.
    Dup,

    /// Pops `right` then `left`, pushing `left + right`. Strings concatenate.
    Add,

    /// Pops `right` then `left`, pushing `left - right`.
    Sub,

    /// Pops `right` then `left`, pushing `left * right`.
    Mul,

    /// Pops two values, pushing `1` if they are equal and `0` otherwise.
    CmpEq,

    /// Pops `right` then `left`, pushing `1` if `left < right` and `0`
    /// otherwise.
    CmpLt,

    /// Continues execution at the given offset.
    Jump(u32),

    /// Pops a value, continuing execution at the given offset if it is zero,
    /// `false` or null.
    JumpIfZero(u32),

    /// Pops an object and pushes the value of its named field.
    GetField(String),

    /// Pops a value then an object, storing the value into the object's named
    /// field.
    PutField(String),

    /// Pushes the value of a static field.
    GetStatic { class: ClassId, field: String },

    /// Pops a value into a static field.
    PutStatic { class: ClassId, field: String },

    /// Allocates an instance of the class with default-initialized fields and
    /// pushes it. Constructors must be invoked separately.
    New(ClassId),

    /// Pops a length and pushes a new array of that many `int`s.
    NewArray,

    /// Pops an index then an array, pushing the element at that index.
    ArrayLoad,

    /// Pops a value, an index and an array, storing the value at that index.
    ArrayStore,

    /// Pops the routine's arguments, last argument first, followed by the
    /// receiver for instance routines, and invokes it.
    Invoke(RoutineId),

    /// Pops `arity` arguments and invokes the named native routine, pushing
    /// its result if it `returns` one.
    InvokeNative {
        name:    String,
        arity:   u8,
        returns: Option<FieldType>,
    },

    /// Pops an object and acquires its monitor.
    MonitorEnter,

    /// Pops an object and releases its monitor.
    MonitorExit,

    /// Pops a value and throws it.
    Throw,

    /// Returns from the routine, popping the return value if the routine has
    /// one.
    Return,
}

impl Instruction {
    /// Checks whether this instruction leaves the current routine.
    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(self, Self::Return)
    }
}
