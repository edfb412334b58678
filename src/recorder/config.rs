//! This module contains the configuration for the recorder.

use std::collections::HashSet;

use crate::constant::{
    DEFAULT_MISS_BACKOFF,
    DEFAULT_MISS_BUDGET,
    DEFAULT_NATIVE_WHITELIST,
    DEFAULT_SUMMARY_CAPACITY,
};

/// The configuration for a [`crate::recorder::Recorder`] instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum number of summaries stored for each routine.
    ///
    /// Defaults to [`DEFAULT_SUMMARY_CAPACITY`].
    pub summary_capacity: usize,

    /// The number of consecutive failed match attempts for a routine after
    /// which the recorder backs off from matching it.
    ///
    /// Defaults to [`DEFAULT_MISS_BUDGET`].
    pub miss_budget: usize,

    /// The number of calls of a routine with a spent miss budget that skip
    /// matching entirely. The call after them makes one more attempt, and a
    /// further miss starts the back-off again.
    ///
    /// Defaults to [`DEFAULT_MISS_BACKOFF`].
    pub miss_backoff: usize,

    /// The simple names of native routines that do not interrupt recording.
    ///
    /// Defaults to [`DEFAULT_NATIVE_WHITELIST`].
    pub native_whitelist: HashSet<String>,

    /// Regular expressions over fully-qualified routine names. Calling a
    /// matching routine interrupts all recording, and the routine itself is
    /// never summarized.
    ///
    /// Defaults to no patterns.
    pub blacklist_patterns: Vec<String>,

    /// The fully-qualified name of the routine before whose first call all
    /// events are ignored, so that interpreter start-up code is not recorded.
    ///
    /// Defaults to [`None`], observing events from the start.
    pub entry_point: Option<String>,
}

impl Config {
    /// Sets the `summary_capacity` config parameter to `value`.
    #[must_use]
    pub fn with_summary_capacity(mut self, value: usize) -> Self {
        self.summary_capacity = value;
        self
    }

    /// Sets the `miss_budget` config parameter to `value`.
    #[must_use]
    pub fn with_miss_budget(mut self, value: usize) -> Self {
        self.miss_budget = value;
        self
    }

    /// Sets the `miss_backoff` config parameter to `value`.
    #[must_use]
    pub fn with_miss_backoff(mut self, value: usize) -> Self {
        self.miss_backoff = value;
        self
    }

    /// Adds `name` to the native whitelist.
    #[must_use]
    pub fn with_whitelisted_native(mut self, name: impl Into<String>) -> Self {
        self.native_whitelist.insert(name.into());
        self
    }

    /// Adds `pattern` to the blacklist patterns.
    #[must_use]
    pub fn with_blacklist_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.blacklist_patterns.push(pattern.into());
        self
    }

    /// Sets the `entry_point` config parameter to `name`.
    #[must_use]
    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let summary_capacity = DEFAULT_SUMMARY_CAPACITY;
        let miss_budget = DEFAULT_MISS_BUDGET;
        let miss_backoff = DEFAULT_MISS_BACKOFF;
        let native_whitelist = DEFAULT_NATIVE_WHITELIST
            .iter()
            .map(ToString::to_string)
            .collect();
        let blacklist_patterns = Vec::new();
        let entry_point = None;
        Self {
            summary_capacity,
            miss_budget,
            miss_backoff,
            native_whitelist,
            blacklist_patterns,
            entry_point,
        }
    }
}
