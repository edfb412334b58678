//! This library implements execution memoization for interpreted programs: it
//! observes the execution of routines, records _summaries_ of what each
//! invocation depended on and what it changed, and replays those summaries in
//! place of executing later invocations that would behave identically.
//!
//! It is a _sound_ memoization. Anything whose effects cannot be captured as
//! reads and writes of object fields (allocation, array access, unknown native
//! calls, synchronization, thrown exceptions and so on) discards the affected
//! recordings rather than risk replaying an incomplete summary.
//!
//! # How it Works
//!
//! From a very high level, the process works as follows:
//!
//! 1. A host interpreter delivers an [`recorder::event::Event`] to the
//!    [`Recorder`] for each call, return and field access it performs.
//! 2. Every call of an eligible routine starts a recording. Its
//!    [`summary::Context`] captures the arguments, the callee and the first
//!    value read from every field, while its [`summary::ModificationSet`]
//!    captures the last value written to every field.
//! 3. When the routine returns, the recording is committed to the
//!    [`summary::store::Store`] as a [`summary::Summary`].
//! 4. When the routine is called again, the recorder looks for a summary whose
//!    context matches the current state through the [`host::Host`] interface.
//!    On a hit it applies the summary's modifications, pushes its return value,
//!    and tells the host to skip the routine's body.
//!
//! The [`vm::VM`] is a small reference interpreter that drives a recorder in
//! exactly this way.
//!
//! # Basic Usage
//!
//! ```
//! use execution_summarizer::{
//!     recorder::{self, event::RoutineKind, Recorder},
//!     value::{FieldType, Value},
//!     vm::{
//!         self,
//!         instruction::Instruction,
//!         program::{ClassDef, Program, Routine},
//!         VM,
//!     },
//!     watchdog::LazyWatchdog,
//! };
//!
//! let mut program = Program::new();
//! let class = program.add_class(ClassDef::new("Math"));
//! let square = program.add_routine(
//!     class,
//!     Routine::new("square", RoutineKind::Static)
//!         .with_params(vec![FieldType::Int])
//!         .returning(FieldType::Int)
//!         .with_locals(1)
//!         .with_code(vec![
//!             Instruction::Load(0),
//!             Instruction::Load(0),
//!             Instruction::Mul,
//!             Instruction::Return,
//!         ]),
//! );
//!
//! let recorder = Recorder::new(recorder::Config::default()).unwrap();
//! let mut vm = VM::new(program, vm::Config::default(), LazyWatchdog.in_rc())
//!     .with_recorder(recorder);
//!
//! // The first call is executed and recorded, the second is replayed.
//! assert_eq!(vm.invoke(square, None, vec![Value::Int(7)]).unwrap(), Some(Value::Int(49)));
//! assert_eq!(vm.invoke(square, None, vec![Value::Int(7)]).unwrap(), Some(Value::Int(49)));
//!
//! let report = vm.recorder_mut().unwrap().finish_run();
//! assert_eq!(report.successful_matches, 1);
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod constant;
pub mod error;
pub mod host;
pub mod recorder;
pub mod summary;
pub mod value;
pub mod vm;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use recorder::{stats::Report, Recorder};
pub use summary::Summary;
