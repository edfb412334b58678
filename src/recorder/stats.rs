//! This module contains the statistics the recorder gathers about the routines
//! it observes, and the [`Report`] it produces at the end of a run.
//!
//! Statistics are diagnostic only and never influence recording decisions.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

use itertools::Itertools;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    constant::INSTRUCTIONS_PER_REPLAYED_WRITE,
    recorder::event::{Interruption, Invocation, RoutineKind},
    value::RoutineId,
};

/// The reason for which the recording of a routine was interrupted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason", content = "detail")]
pub enum AbortReason {
    /// A native routine not on the whitelist was executed.
    NativeCall(String),

    /// An object was allocated.
    Allocation,

    /// An array element was accessed.
    ArrayAccess,

    /// A constructor or class initializer was entered.
    Initializer,

    /// A routine matching a blacklist pattern was called.
    BlacklistPattern,

    /// A routine taking or returning an array was called.
    ArraySignature,

    /// An array typed field was accessed.
    ArrayField,

    /// A field of a shared object or class was accessed.
    SharedAccess,

    /// A field of a frozen object or class was accessed.
    FrozenAccess,

    /// The recording frame was left without its routine returning.
    Unwound,

    /// The host reported something that cannot be observed.
    Interruption(Interruption),
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NativeCall(name) => write!(f, "native call {name}"),
            Self::Allocation => write!(f, "allocation"),
            Self::ArrayAccess => write!(f, "array access"),
            Self::Initializer => write!(f, "initializer"),
            Self::BlacklistPattern => write!(f, "blacklisted routine"),
            Self::ArraySignature => write!(f, "array signature"),
            Self::ArrayField => write!(f, "array field"),
            Self::SharedAccess => write!(f, "shared field access"),
            Self::FrozenAccess => write!(f, "frozen field access"),
            Self::Unwound => write!(f, "unwound"),
            Self::Interruption(interruption) => write!(f, "{interruption}"),
        }
    }
}

/// The counters kept for a single routine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineStatistics {
    pub name:                String,
    pub kind:                RoutineKind,
    pub instruction_count:   usize,
    pub total_calls:         usize,
    pub recordings_started:  usize,
    pub summaries_committed: usize,
    pub attempted_matches:   usize,
    pub successful_matches:  usize,
    pub failed_matches:      usize,
    pub read_count:          usize,
    pub write_count:         usize,
    pub saved_instructions:  usize,

    /// Whether the routine stopped being recorded because its summary storage
    /// filled up.
    pub recorded: bool,

    /// Why the routine was blacklisted, if it was.
    pub interruption: Option<AbortReason>,
}

impl RoutineStatistics {
    fn new(invocation: &Invocation) -> Self {
        Self {
            name:                invocation.name.clone(),
            kind:                invocation.kind,
            instruction_count:   invocation.instruction_count,
            total_calls:         0,
            recordings_started:  0,
            summaries_committed: 0,
            attempted_matches:   0,
            successful_matches:  0,
            failed_matches:      0,
            read_count:          0,
            write_count:         0,
            saved_instructions:  0,
            recorded:            false,
            interruption:        None,
        }
    }
}

/// The statistics for all routines seen during a run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    routines: HashMap<RoutineId, RoutineStatistics>,
}

impl Statistics {
    /// Creates an empty set of statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the statistics for `routine`, if it has been called.
    #[must_use]
    pub fn routine(&self, routine: RoutineId) -> Option<&RoutineStatistics> {
        self.routines.get(&routine)
    }

    /// Counts a call described by `invocation`.
    pub fn record_call(&mut self, invocation: &Invocation) {
        self.routines
            .entry(invocation.routine)
            .or_insert_with(|| RoutineStatistics::new(invocation))
            .total_calls += 1;
    }

    /// Applies `update` to the statistics of `routine`. Routines that have
    /// never been called have no statistics and are ignored.
    pub fn update(&mut self, routine: RoutineId, update: impl FnOnce(&mut RoutineStatistics)) {
        if let Some(stats) = self.routines.get_mut(&routine) {
            update(stats);
        }
    }

    /// Notes that recording `routine` was interrupted for `reason`.
    ///
    /// The first reason is kept, except that host interruptions override any
    /// earlier reason.
    pub fn record_interruption(&mut self, routine: RoutineId, reason: &AbortReason) {
        self.update(routine, |stats| {
            if stats.interruption.is_none() || matches!(reason, AbortReason::Interruption(_)) {
                stats.interruption = Some(reason.clone());
            }
        });
    }

    /// Counts a replayed call of `routine` and estimates the instructions that
    /// replay saved, given the number of `reads` its summary checked and the
    /// number of `writes` it applied.
    pub fn record_replay(&mut self, routine: RoutineId, reads: usize, writes: usize) {
        self.update(routine, |stats| {
            let replay_cost = reads + INSTRUCTIONS_PER_REPLAYED_WRITE * writes;
            stats.successful_matches += 1;
            stats.saved_instructions += stats.instruction_count.saturating_sub(replay_cost);
        });
    }

    /// Removes all statistics.
    pub fn clear(&mut self) {
        self.routines.clear();
    }

    /// Iterates over the statistics of every routine.
    pub fn iter(&self) -> impl Iterator<Item = &RoutineStatistics> {
        self.routines.values()
    }
}

/// The end of run summary of the recorder's behaviour.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run_id:                       Uuid,
    pub unique_routines:              usize,
    pub total_calls:                  usize,
    pub static_calls:                 usize,
    pub instance_calls:               usize,
    pub constructor_calls:            usize,
    pub class_initializer_calls:      usize,
    pub stored_summaries:             usize,
    pub recorded_routines:            usize,
    pub blacklisted_routines:         usize,
    pub attempted_matches:            usize,
    pub successful_matches:           usize,
    pub failed_matches:               usize,
    pub estimated_saved_instructions: usize,

    /// The per-routine statistics, sorted by routine name.
    pub routines: Vec<RoutineStatistics>,
}

impl Report {
    /// Builds the report for the run `run_id` from its `statistics`, given the
    /// number of summaries left in storage.
    #[must_use]
    pub fn new(run_id: Uuid, statistics: &Statistics, stored_summaries: usize) -> Self {
        let routines = statistics
            .iter()
            .cloned()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect_vec();
        let calls_of = |kind: RoutineKind| {
            routines
                .iter()
                .filter(|r| r.kind == kind)
                .map(|r| r.total_calls)
                .sum()
        };

        Self {
            run_id,
            unique_routines: routines.len(),
            total_calls: routines.iter().map(|r| r.total_calls).sum(),
            static_calls: calls_of(RoutineKind::Static),
            instance_calls: calls_of(RoutineKind::Instance),
            constructor_calls: calls_of(RoutineKind::Constructor),
            class_initializer_calls: calls_of(RoutineKind::ClassInitializer),
            stored_summaries,
            recorded_routines: routines.iter().filter(|r| r.recorded).count(),
            blacklisted_routines: routines.iter().filter(|r| r.interruption.is_some()).count(),
            attempted_matches: routines.iter().map(|r| r.attempted_matches).sum(),
            successful_matches: routines.iter().map(|r| r.successful_matches).sum(),
            failed_matches: routines.iter().map(|r| r.failed_matches).sum(),
            estimated_saved_instructions: routines.iter().map(|r| r.saved_instructions).sum(),
            routines,
        }
    }

    /// Renders the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "run {}", self.run_id)?;
        writeln!(
            f,
            "calls: {} total over {} routines ({} static, {} instance, {} constructor, {} class \
             initializer)",
            self.total_calls,
            self.unique_routines,
            self.static_calls,
            self.instance_calls,
            self.constructor_calls,
            self.class_initializer_calls
        )?;
        writeln!(
            f,
            "matches: {} attempted, {} successful, {} failed",
            self.attempted_matches, self.successful_matches, self.failed_matches
        )?;
        writeln!(
            f,
            "summaries: {} stored, {} routines recorded, {} blacklisted",
            self.stored_summaries, self.recorded_routines, self.blacklisted_routines
        )?;
        writeln!(
            f,
            "estimated saved instructions: {}",
            self.estimated_saved_instructions
        )?;

        let lines = self
            .routines
            .iter()
            .map(|r| {
                let status = match (&r.interruption, r.recorded) {
                    (Some(reason), _) => format!("blacklisted ({reason})"),
                    (None, true) => "recorded".to_string(),
                    (None, false) => "open".to_string(),
                };
                format!(
                    "  {}: calls={} matched={}/{} reads={} writes={} {status}",
                    r.name,
                    r.total_calls,
                    r.successful_matches,
                    r.attempted_matches,
                    r.read_count,
                    r.write_count
                )
            })
            .join("\n");
        write!(f, "{lines}")
    }
}

#[cfg(test)]
mod test {
    use uuid::Uuid;

    use crate::{
        recorder::{
            event::{Interruption, Invocation, RoutineKind},
            stats::{AbortReason, Report, Statistics},
        },
        value::RoutineId,
    };

    fn invocation(routine: u32, name: &str, kind: RoutineKind) -> Invocation {
        Invocation {
            routine: RoutineId(routine),
            name: name.into(),
            kind,
            callee: None,
            args: vec![],
            params: vec![],
            returns: None,
            depth: 1,
            instruction_count: 20,
        }
    }

    #[test]
    fn host_interruptions_override_earlier_reasons() {
        let mut stats = Statistics::new();
        stats.record_call(&invocation(0, "A.f", RoutineKind::Static));

        stats.record_interruption(RoutineId(0), &AbortReason::Allocation);
        stats.record_interruption(RoutineId(0), &AbortReason::ArrayAccess);
        assert_eq!(
            stats.routine(RoutineId(0)).and_then(|r| r.interruption.clone()),
            Some(AbortReason::Allocation)
        );

        stats.record_interruption(
            RoutineId(0),
            &AbortReason::Interruption(Interruption::ObjectLocked),
        );
        assert_eq!(
            stats.routine(RoutineId(0)).and_then(|r| r.interruption.clone()),
            Some(AbortReason::Interruption(Interruption::ObjectLocked))
        );
    }

    #[test]
    fn estimates_saved_instructions() {
        let mut stats = Statistics::new();
        stats.record_call(&invocation(0, "A.f", RoutineKind::Static));
        stats.record_replay(RoutineId(0), 2, 3);
        stats.record_replay(RoutineId(0), 30, 0);

        let routine = stats.routine(RoutineId(0)).expect("Routine was called");
        assert_eq!(routine.successful_matches, 2);
        assert_eq!(routine.saved_instructions, 20 - (2 + 3 * 3));
    }

    #[test]
    fn report_aggregates_routines() -> anyhow::Result<()> {
        let mut stats = Statistics::new();
        stats.record_call(&invocation(1, "B.g", RoutineKind::Instance));
        stats.record_call(&invocation(0, "A.f", RoutineKind::Static));
        stats.record_call(&invocation(0, "A.f", RoutineKind::Static));
        stats.record_call(&invocation(2, "C.<init>", RoutineKind::Constructor));
        stats.record_interruption(RoutineId(1), &AbortReason::NativeCall("sleep".into()));
        stats.update(RoutineId(0), |r| r.recorded = true);

        let run_id = Uuid::new_v4();
        let report = Report::new(run_id, &stats, 7);
        assert_eq!(report.unique_routines, 3);
        assert_eq!(report.total_calls, 4);
        assert_eq!(report.static_calls, 2);
        assert_eq!(report.instance_calls, 1);
        assert_eq!(report.constructor_calls, 1);
        assert_eq!(report.recorded_routines, 1);
        assert_eq!(report.blacklisted_routines, 1);
        assert_eq!(report.stored_summaries, 7);
        assert_eq!(report.routines[0].name, "A.f");

        let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
        assert_eq!(json["runId"], run_id.to_string());
        assert_eq!(json["routines"][1]["interruption"]["reason"], "nativeCall");

        let text = report.to_string();
        assert!(text.contains("B.g: calls=1 matched=0/0 reads=0 writes=0 blacklisted (native call sleep)"));

        Ok(())
    }
}
