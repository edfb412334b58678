//! This module contains the [`Recorder`], the state machine that observes a
//! host interpreter's execution, records summaries of routine invocations, and
//! replays those summaries in place of executing matching invocations.
//!
//! # Recording
//!
//! Every call of an eligible routine pushes a [`Recording`] onto the recording
//! stack. Field reads and writes are then added to _every_ active recording,
//! so a nested invocation's effects become part of the summaries of all the
//! invocations that enclose it. When the routine returns, its recording is
//! committed to the [`Store`] as a new [`crate::summary::Summary`].
//!
//! Anything whose effects cannot be captured as field reads and writes (see
//! [`AbortReason`]) discards every active recording and blacklists the
//! affected routines for the remainder of the run.
//!
//! # Replay
//!
//! When a routine with stored summaries is called, the recorder looks for a
//! summary whose context matches the current state. On a hit it writes the
//! summary's modifications into the host, pushes the return value, and answers
//! [`Directive::SkipToReturn`] so that the host skips the routine's body.

pub mod config;
pub mod event;
pub mod state;
pub mod stats;

use std::collections::{HashMap, HashSet};

pub use config::Config;
use regex::RegexSet;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    host::{push_return, Host},
    recorder::{
        event::{Directive, Event, FieldAccess, Invocation},
        state::{Recording, RecordingState},
        stats::{AbortReason, Report, Statistics},
    },
    summary::{store::Store, Context, ModificationSet, Summary},
    value::{FieldType, RoutineId, Value},
};

/// The recording controller.
///
/// A recorder is driven by a single host, one event at a time, through
/// [`Self::on_event`]. All of its state is owned, so independent hosts can use
/// independent recorders.
#[derive(Clone, Debug)]
pub struct Recorder {
    /// The configuration the recorder was created with.
    config: Config,

    /// The compiled form of `config.blacklist_patterns`.
    blacklist_patterns: RegexSet,

    /// The summaries recorded so far.
    store: Store,

    /// The active recordings, innermost last.
    recordings: Vec<Recording>,

    /// Routines whose summary storage is full.
    recorded: HashSet<RoutineId>,

    /// Routines that will never be recorded or replayed again.
    blacklist: HashSet<RoutineId>,

    /// The number of consecutive failed match attempts per routine.
    misses: HashMap<RoutineId, usize>,

    statistics: Statistics,

    /// The identifier of the current run.
    run_id: Uuid,

    /// Whether the configured entry point has been called yet.
    entered: bool,
}

impl Recorder {
    /// Creates a new recorder using the provided `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlacklistPattern`] if any of the configured
    /// blacklist patterns is not a valid regular expression.
    pub fn new(config: Config) -> Result<Self> {
        let blacklist_patterns = RegexSet::new(&config.blacklist_patterns)
            .map_err(|e| Error::InvalidBlacklistPattern(e.to_string()))?;
        let store = Store::with_capacity(config.summary_capacity);
        let recordings = Vec::new();
        let recorded = HashSet::new();
        let blacklist = HashSet::new();
        let misses = HashMap::new();
        let statistics = Statistics::new();
        let run_id = Uuid::new_v4();
        let entered = config.entry_point.is_none();

        Ok(Self {
            config,
            blacklist_patterns,
            store,
            recordings,
            recorded,
            blacklist,
            misses,
            statistics,
            run_id,
            entered,
        })
    }

    /// Starts a new run, forgetting everything recorded so far.
    pub fn begin_run(&mut self) {
        self.store.clear();
        self.recordings.clear();
        self.recorded.clear();
        self.blacklist.clear();
        self.misses.clear();
        self.statistics.clear();
        self.run_id = Uuid::new_v4();
        self.entered = self.config.entry_point.is_none();

        debug!(run = %self.run_id, "began run");
    }

    /// Ends the current run, discarding any recordings that are still open,
    /// and produces its report.
    pub fn finish_run(&mut self) -> Report {
        self.recordings.clear();
        let report = self.report();

        debug!(
            run = %self.run_id,
            summaries = report.stored_summaries,
            saved = report.estimated_saved_instructions,
            "finished run"
        );

        report
    }

    /// Produces the report for the run so far.
    #[must_use]
    pub fn report(&self) -> Report {
        Report::new(self.run_id, &self.statistics, self.store.len())
    }

    /// Handles a single `event` delivered by the `host`.
    ///
    /// The answer is [`Directive::SkipToReturn`] only for a call whose effects
    /// were replayed from a summary.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the host rejects a write or push made while replaying
    /// a summary. The host may then be partially updated.
    pub fn on_event(&mut self, host: &mut impl Host, event: Event) -> Result<Directive> {
        if !self.entered {
            match &event {
                Event::Call(invocation)
                    if self.config.entry_point.as_ref() == Some(&invocation.name) =>
                {
                    debug!(routine = %invocation.name, "reached entry point");
                    self.entered = true;
                }
                _ => return Ok(Directive::Continue),
            }
        }

        match event {
            Event::Call(invocation) => return self.on_call(host, invocation),
            Event::Return {
                routine,
                depth,
                value,
            } => self.on_return(routine, depth, value),
            Event::FieldRead(access) => self.on_field_read(&*host, access),
            Event::FieldWrite(access) => self.on_field_write(&*host, access),
            Event::NativeCall { name } => {
                let simple_name = name.rsplit('.').next().unwrap_or(&name);
                if !self.config.native_whitelist.contains(simple_name) {
                    self.abort(&AbortReason::NativeCall(name));
                }
            }
            Event::Allocation => self.abort(&AbortReason::Allocation),
            Event::ArrayAccess => self.abort(&AbortReason::ArrayAccess),
            Event::Interruption(interruption) => {
                self.abort(&AbortReason::Interruption(interruption));
            }
        }

        Ok(Directive::Continue)
    }

    /// Gets the recording state of `routine`.
    #[must_use]
    pub fn state(&self, routine: RoutineId) -> RecordingState {
        if self.blacklist.contains(&routine) {
            RecordingState::Blacklisted
        } else if self.is_recording(routine) {
            RecordingState::Recording
        } else if self.recorded.contains(&routine) {
            RecordingState::Recorded
        } else {
            RecordingState::Idle
        }
    }

    /// Gets the summaries recorded so far.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Gets the statistics gathered so far.
    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Gets the number of recordings currently in progress.
    #[must_use]
    pub fn active_recordings(&self) -> usize {
        self.recordings.len()
    }

    /// Gets the configuration of the recorder.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gets the identifier of the current run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Discards every recording of an invocation deeper than `depth` on the
    /// host's call stack, blacklisting their routines.
    ///
    /// Hosts call this when frames are popped without returning, such as when
    /// execution fails. Returns also unwind implicitly.
    pub fn unwind(&mut self, depth: usize) {
        if let Some(index) = self.recordings.iter().position(|r| r.depth > depth) {
            for recording in self.recordings.split_off(index) {
                debug!(routine = %recording.name, depth = recording.depth, "discarded unwound recording");
                self.blacklist_routine(recording.routine, &AbortReason::Unwound);
            }
        }
    }

    fn is_recording(&self, routine: RoutineId) -> bool {
        self.recordings.iter().any(|r| r.routine == routine)
    }

    fn on_call(&mut self, host: &mut impl Host, invocation: Invocation) -> Result<Directive> {
        self.statistics.record_call(&invocation);
        let routine = invocation.routine;

        if !invocation.kind.is_summarizable() {
            self.abort(&AbortReason::Initializer);
            self.blacklist_routine(routine, &AbortReason::Initializer);
            return Ok(Directive::Continue);
        }

        if self.blacklist_patterns.is_match(&invocation.name) {
            self.abort(&AbortReason::BlacklistPattern);
            self.blacklist_routine(routine, &AbortReason::BlacklistPattern);
            return Ok(Directive::Continue);
        }

        if self.blacklist.contains(&routine) {
            return Ok(Directive::Continue);
        }

        if self.try_replay(host, &invocation)? {
            return Ok(Directive::SkipToReturn);
        }

        if self.recorded.contains(&routine) || self.is_recording(routine) {
            return Ok(Directive::Continue);
        }

        if invocation.has_array_signature() {
            self.abort(&AbortReason::ArraySignature);
            self.blacklist_routine(routine, &AbortReason::ArraySignature);
            return Ok(Directive::Continue);
        }

        if !self.store.can_store_more(routine) {
            self.mark_recorded(routine);
            return Ok(Directive::Continue);
        }

        debug!(routine = %invocation.name, depth = invocation.depth, "started recording");
        self.statistics
            .update(routine, |stats| stats.recordings_started += 1);

        let Invocation {
            name,
            callee,
            args,
            returns,
            depth,
            ..
        } = invocation;
        let context = Context::new(args.clone(), callee, host.is_single_threaded());
        let modifications = ModificationSet::new(args);
        self.recordings.push(Recording {
            routine,
            name,
            depth,
            returns,
            context,
            modifications,
        });

        Ok(Directive::Continue)
    }

    /// Attempts to replay a stored summary for `invocation`, returning whether
    /// it did.
    fn try_replay(&mut self, host: &mut impl Host, invocation: &Invocation) -> Result<bool> {
        let routine = invocation.routine;
        if !self.store.has_summary(routine) {
            return Ok(false);
        }
        if !self.may_attempt_match(routine) {
            return Ok(false);
        }

        self.statistics
            .update(routine, |stats| stats.attempted_matches += 1);
        let single_threaded = host.is_single_threaded();
        let candidate = self
            .store
            .find_match(
                &*host,
                routine,
                invocation.callee,
                &invocation.args,
                single_threaded,
            )
            .filter(|summary| Self::is_replayable(&*host, summary, invocation.returns))
            .cloned();

        let Some(summary) = candidate else {
            *self.misses.entry(routine).or_default() += 1;
            self.statistics
                .update(routine, |stats| stats.failed_matches += 1);
            trace!(routine = %invocation.name, "no replayable summary");
            return Ok(false);
        };

        self.misses.remove(&routine);
        for recording in &mut self.recordings {
            recording.absorb(&summary);
        }

        let modifications = summary.modifications();
        modifications.apply(host)?;
        if let (Some(tp), Some(value)) = (invocation.returns, modifications.return_value()) {
            push_return(host, tp, value)?;
        }

        self.statistics.record_replay(
            routine,
            summary.context().tracked_field_count(),
            modifications.write_count(),
        );
        debug!(routine = %invocation.name, depth = invocation.depth, "replayed summary");

        Ok(true)
    }

    /// Checks whether a match should be attempted for `routine`, counting the
    /// call against the back-off once its miss budget is spent.
    fn may_attempt_match(&mut self, routine: RoutineId) -> bool {
        let budget = self.config.miss_budget;
        let Some(misses) = self.misses.get_mut(&routine) else {
            return true;
        };
        if *misses < budget {
            return true;
        }

        if *misses - budget < self.config.miss_backoff {
            *misses += 1;
            return false;
        }

        // One retry; a miss spends the budget again.
        *misses = budget.saturating_sub(1);
        true
    }

    /// Checks whether a matched `summary` can be replayed for a routine
    /// returning `returns`.
    ///
    /// Static fields may be changed by class initialization that the host
    /// performs lazily, so summaries that depend on them are never replayed.
    /// Neither are summaries that read from or write to an owner that has
    /// since become shared or frozen, as replaying them would hand its fields
    /// to the enclosing recordings without the checks a real access gets.
    fn is_replayable(host: &impl Host, summary: &Summary, returns: Option<FieldType>) -> bool {
        let context = summary.context();
        let reads_untrackable = context
            .tracked_fields()
            .any(|(owner, _, _)| host.is_shared(owner) || host.is_frozen(owner));

        !context.has_static_fields()
            && !reads_untrackable
            && !summary.modifications().any_target_frozen_or_shared(host)
            && returns.is_some() == summary.modifications().return_value().is_some()
    }

    fn on_return(&mut self, routine: RoutineId, depth: usize, value: Option<Value>) {
        self.unwind(depth);

        match self.recordings.last() {
            Some(recording) if recording.is_for(routine, depth) => (),
            _ => return,
        }
        let Some(mut recording) = self.recordings.pop() else {
            return;
        };

        if let Some(value) = value {
            let value = recording
                .returns
                .and_then(|tp| value.narrowed_to(tp))
                .unwrap_or(value);
            recording.modifications.set_return_value(value);
        }

        self.commit(recording);
    }

    fn commit(&mut self, recording: Recording) {
        let Recording {
            routine,
            name,
            context,
            modifications,
            ..
        } = recording;

        match self.store.add_summary(routine, context, modifications) {
            Ok(()) => {
                self.misses.remove(&routine);
                self.statistics
                    .update(routine, |stats| stats.summaries_committed += 1);
                debug!(
                    routine = %name,
                    summaries = self.store.summaries(routine).len(),
                    "committed summary"
                );

                if !self.store.can_store_more(routine) {
                    self.mark_recorded(routine);
                }
            }
            Err(error) => {
                debug!(routine = %name, %error, "summary not stored");
                self.mark_recorded(routine);
            }
        }
    }

    fn on_field_read(&mut self, host: &impl Host, access: FieldAccess) {
        let Some(innermost) = self.recordings.last() else {
            return;
        };
        self.statistics
            .update(innermost.routine, |stats| stats.read_count += 1);

        if let Some(reason) = Self::check_access(host, &access) {
            self.abort(&reason);
            return;
        }

        let FieldAccess {
            owner,
            field,
            tp,
            value,
        } = access;
        let value = value.narrowed_to(tp).unwrap_or(value);
        for recording in &mut self.recordings {
            recording.observe_read(owner, &field, value.clone());
        }
    }

    fn on_field_write(&mut self, host: &impl Host, access: FieldAccess) {
        let Some(innermost) = self.recordings.last() else {
            return;
        };
        self.statistics
            .update(innermost.routine, |stats| stats.write_count += 1);

        if let Some(reason) = Self::check_access(host, &access) {
            self.abort(&reason);
            return;
        }

        let FieldAccess {
            owner,
            field,
            tp,
            value,
        } = access;
        let value = value.narrowed_to(tp).unwrap_or(value);
        for recording in &mut self.recordings {
            recording
                .modifications
                .record(owner, field.as_str(), tp, value.clone());
        }
    }

    /// Checks whether a field `access` can be tracked, returning the reason it
    /// cannot otherwise.
    fn check_access(host: &impl Host, access: &FieldAccess) -> Option<AbortReason> {
        if !access.tp.is_snapshottable() {
            Some(AbortReason::ArrayField)
        } else if host.is_shared(access.owner) {
            Some(AbortReason::SharedAccess)
        } else if host.is_frozen(access.owner) {
            Some(AbortReason::FrozenAccess)
        } else {
            None
        }
    }

    /// Discards every active recording, blacklisting their routines.
    fn abort(&mut self, reason: &AbortReason) {
        for recording in std::mem::take(&mut self.recordings) {
            debug!(routine = %recording.name, depth = recording.depth, %reason, "aborted recording");
            self.blacklist_routine(recording.routine, reason);
        }
    }

    fn blacklist_routine(&mut self, routine: RoutineId, reason: &AbortReason) {
        self.blacklist.insert(routine);
        self.statistics.record_interruption(routine, reason);
    }

    fn mark_recorded(&mut self, routine: RoutineId) {
        if self.recorded.insert(routine) {
            self.statistics.update(routine, |stats| stats.recorded = true);
        }
    }
}
