//! This module contains the data recorded about routine invocations: the
//! [`Context`] capturing an invocation's precondition, the
//! [`ModificationSet`] capturing its postcondition, the [`Summary`] pairing
//! them, and the [`store::Store`] that keeps summaries per routine.

pub mod context;
pub mod modifications;
pub mod store;

pub use context::Context;
pub use modifications::ModificationSet;

/// A single recorded fact about a routine: when invoked in a state matching the
/// `context`, the routine's effect is described by the `modifications`.
///
/// Summaries are immutable once recorded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Summary {
    context:       Context,
    modifications: ModificationSet,
}

impl Summary {
    /// Constructs a new summary from its parts.
    #[must_use]
    pub fn new(context: Context, modifications: ModificationSet) -> Self {
        Self {
            context,
            modifications,
        }
    }

    /// Gets the precondition of the summary.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Gets the postcondition of the summary.
    #[must_use]
    pub fn modifications(&self) -> &ModificationSet {
        &self.modifications
    }
}
