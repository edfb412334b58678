//! This module contains the generic container used to attach interpreter
//! locations to errors.

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::value::RoutineId;

/// A position in the interpreted program: an instruction offset within the
/// code of a routine.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Location {
    /// The routine whose code contains the instruction.
    pub routine: RoutineId,

    /// The offset of the instruction in the routine's code.
    pub offset: u32,
}

impl Location {
    /// Constructs a location at `offset` in the code of `routine`.
    #[must_use]
    pub fn new(routine: RoutineId, offset: u32) -> Self {
        Self { routine, offset }
    }
}

/// Displays the routine handle followed by the hexadecimal-encoded
/// instruction offset.
impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[0x{}]",
            self.routine,
            hex::encode(self.offset.to_be_bytes())
        )
    }
}

/// An error that is localised to a particular instruction of the interpreted
/// program.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The instruction at which the error occurred.
    pub location: Location,

    /// The error data
    pub payload: E,
}

impl<E> Display for Located<E>
where
    E: Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.location, self.payload)
    }
}

/// A trait for types that can have a program location attached to them.
pub trait Locatable
where
    Self: Sized,
{
    /// The return type with the attached location.
    type Located;

    /// Attach `location` to the error.
    fn locate(self, location: Location) -> Self::Located;
}

/// A blanket implementation that allows for attaching a location to any result.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, location: Location) -> Self::Located {
        self.map_err(|e| Located {
            location,
            payload: e,
        })
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::{
            container::{Locatable, Location},
            execution::Error,
        },
        value::RoutineId,
    };

    #[test]
    fn located_errors_render_hex_offsets() {
        let error = Error::StackUnderflow.locate(Location::new(RoutineId(2), 0x1f));
        assert_eq!(
            error.to_string(),
            "[routine#2[0x0000001f]]: The operand stack was empty"
        );
    }

    #[test]
    fn results_can_be_located() {
        let result: Result<(), Error> = Err(Error::StackUnderflow);
        let located = result.locate(Location::new(RoutineId(0), 3));

        assert_eq!(located.unwrap_err().location, Location::new(RoutineId(0), 3));
    }
}
