//! This module contains constants that are needed throughout the codebase.

/// The default maximum number of summaries that will be stored for any single
/// routine.
///
/// Once a routine has this many summaries it is never recorded again for the
/// remainder of the run.
pub const DEFAULT_SUMMARY_CAPACITY: usize = 100;

/// The default number of consecutive failed attempts to match a summary for a
/// routine before the recorder backs off from matching that routine.
///
/// The budget is restored by a successful match or by committing a new summary
/// for the routine.
pub const DEFAULT_MISS_BUDGET: usize = 5;

/// The default number of calls of a routine whose miss budget is spent that
/// are skipped without attempting a match, before a single attempt is allowed
/// again.
pub const DEFAULT_MISS_BACKOFF: usize = 20;

/// The names of native routines that are known not to have side effects that
/// cannot be captured in a summary.
///
/// Calls to these do not interrupt recording.
pub const DEFAULT_NATIVE_WHITELIST: [&str; 5] =
    ["desiredAssertionStatus", "println", "hashCode", "min", "max"];

/// The number of instructions that the interpreter executes between polls of
/// its watchdog by default.
pub const DEFAULT_WATCHDOG_POLL_INTERVAL: usize = 100;

/// The default maximum depth of the reference interpreter's call stack.
pub const DEFAULT_MAXIMUM_CALL_DEPTH: usize = 1024;

/// The default maximum number of instructions that the reference interpreter
/// will execute for a single top-level invocation.
pub const DEFAULT_INSTRUCTION_LIMIT: usize = 10_000_000;

/// The approximate number of instructions that replaying a single field write
/// costs when estimating the savings from a summary.
///
/// Each replayed write corresponds roughly to two loads and a store.
pub const INSTRUCTIONS_PER_REPLAYED_WRITE: usize = 3;
