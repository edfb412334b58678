//! Stopping a running interpreter from the outside.
//!
//! The interpreter asks its [`Watchdog`] whether to stop between
//! instructions, once every [`Watchdog::poll_every`] of them. A stop request
//! therefore lands late by up to that many instructions, and a recording open
//! at that point is unwound along with the frames that fail.

use std::{
    fmt::Debug,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::constant::DEFAULT_WATCHDOG_POLL_INTERVAL;

/// A watchdog as held by the interpreter.
pub type DynWatchdog = Rc<dyn Watchdog>;

/// Decides whether an invocation should be cut short.
pub trait Watchdog
where
    Self: Debug,
{
    /// Returns `true` once the interpreter should fail with
    /// [`crate::error::execution::Error::StoppedByWatchdog`].
    #[must_use]
    fn should_stop(&self) -> bool;

    /// Gets how many instructions run between two calls to
    /// [`Self::should_stop`]. Zero is treated as one.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// Never stops the interpreter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    /// Wraps `self` for handing to the interpreter.
    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        usize::MAX
    }
}

/// Stops the interpreter once a shared flag is raised, typically by another
/// thread.
///
/// It is polled every [`DEFAULT_WATCHDOG_POLL_INTERVAL`] instructions unless
/// told otherwise through [`Self::polling_every`].
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    stop:     Arc<AtomicBool>,
    interval: usize,
}

impl FlagWatchdog {
    /// Creates a watchdog that stops the interpreter once `stop` is set.
    #[must_use]
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            stop,
            interval: DEFAULT_WATCHDOG_POLL_INTERVAL,
        }
    }

    /// Sets the number of instructions between polls to `interval`.
    #[must_use]
    pub fn polling_every(mut self, interval: usize) -> Self {
        self.interval = interval;
        self
    }

    /// Wraps `self` for handing to the interpreter.
    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn poll_every(&self) -> usize {
        self.interval
    }
}

/// Stops the interpreter once a wall-clock budget, counted from construction,
/// is used up.
///
/// A budget too large to represent as an [`Instant`] never runs out.
#[derive(Clone, Debug)]
pub struct DeadlineWatchdog {
    deadline: Option<Instant>,
    interval: usize,
}

impl DeadlineWatchdog {
    /// Creates a watchdog that stops the interpreter once `budget` has
    /// elapsed.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(budget),
            interval: DEFAULT_WATCHDOG_POLL_INTERVAL,
        }
    }

    /// Sets the number of instructions between polls to `interval`.
    #[must_use]
    pub fn polling_every(mut self, interval: usize) -> Self {
        self.interval = interval;
        self
    }

    /// Gets the time left before the budget runs out, or [`None`] if it never
    /// does.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Wraps `self` for handing to the interpreter.
    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for DeadlineWatchdog {
    fn should_stop(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn poll_every(&self) -> usize {
        self.interval
    }
}
