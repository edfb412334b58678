//! This module contains the reference interpreter: a small stack-based virtual
//! machine whose execution can be observed, and short-circuited, by a
//! [`Recorder`].
//!
//! The interpreter delivers an [`Event`] to its recorder for every call,
//! return, field access, allocation, array access, native call, monitor
//! operation and thrown exception. When the recorder answers a call with
//! [`Directive::SkipToReturn`], the interpreter jumps straight to the callee's
//! final return instruction, where the recorder has already placed the return
//! value on the callee's operand stack.

pub mod heap;
pub mod instruction;
pub mod program;

use std::rc::Rc;

use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    constant::{DEFAULT_INSTRUCTION_LIMIT, DEFAULT_MAXIMUM_CALL_DEPTH},
    error::{
        self,
        container::{Locatable, Location},
        execution::{Error, Result},
        host,
    },
    recorder::{
        event::{Directive, Event, FieldAccess, Interruption, Invocation, RoutineKind},
        Recorder,
    },
    value::{ClassId, FieldOwner, FieldType, ObjectId, RoutineId, Value},
    vm::{
        heap::{FrameHost, Heap},
        instruction::Instruction,
        program::Program,
    },
    watchdog::DynWatchdog,
};

/// The activation record of a single routine invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub routine: RoutineId,

    /// The offset of the instruction about to execute.
    pub pc: usize,

    pub locals: Vec<Value>,
    pub stack:  Vec<Value>,
}

/// What happened to the frame stack as the result of executing an instruction.
#[derive(Clone, Debug, PartialEq)]
enum Flow {
    Continue,
    Returned(Option<Value>),
}

/// The arithmetic operations of the interpreter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Arithmetic {
    Add,
    Sub,
    Mul,
}

/// The reference interpreter.
#[derive(Clone, Debug)]
pub struct VM {
    /// The program being executed.
    program: Rc<Program>,

    heap: Heap,

    /// The frames of the routines being executed, innermost last.
    frames: Vec<Frame>,

    /// The recorder observing execution, if any.
    recorder: Option<Recorder>,

    /// The configuration of the virtual machine.
    config: Config,

    /// A watchdog that gets polled at intervals to check whether execution
    /// needs to stop.
    watchdog: DynWatchdog,

    /// The total number of instructions executed.
    executed: usize,

    /// The lines printed by the program.
    output: Vec<String>,
}

impl VM {
    /// Constructs a new virtual machine that executes `program`.
    #[must_use]
    pub fn new(program: Program, config: Config, watchdog: DynWatchdog) -> Self {
        let heap = Heap::new(program.classes());
        Self {
            program: Rc::new(program),
            heap,
            frames: Vec::new(),
            recorder: None,
            config,
            watchdog,
            executed: 0,
            output: Vec::new(),
        }
    }

    /// Attaches `recorder` to the virtual machine, so that it observes all
    /// further execution.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Invokes `routine` on `callee` with `args`, running it to completion.
    ///
    /// Static routines trigger the initialization of their class first.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if execution fails. Any frames pushed by this invocation
    /// are then discarded, as are any recordings of their routines.
    pub fn invoke(
        &mut self,
        routine: RoutineId,
        callee: Option<ObjectId>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let base = self.frames.len();
        let executed_before = self.executed;
        debug!(%routine, "invoking");

        let result = self.invoke_from(base, routine, callee, args);
        if result.is_err() {
            self.frames.truncate(base);
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.unwind(base);
            }
        }

        debug!(
            %routine,
            executed = self.executed - executed_before,
            success = result.is_ok(),
            "invocation finished"
        );
        result
    }

    /// Invokes the routine with the fully-qualified `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no such routine exists, or if execution fails.
    pub fn invoke_by_name(
        &mut self,
        name: &str,
        callee: Option<ObjectId>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let routine = self
            .program
            .routine_id(name)
            .ok_or_else(|| Error::UnknownRoutineName(name.to_string()).locate(self.location()))?;
        self.invoke(routine, callee, args)
    }

    fn invoke_from(
        &mut self,
        base: usize,
        routine: RoutineId,
        callee: Option<ObjectId>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let program = Rc::clone(&self.program);
        let definition = program
            .routine(routine)
            .ok_or_else(|| Error::NoSuchRoutine(routine).locate(Location::new(routine, 0)))?;
        if definition.kind == RoutineKind::Static && self.initialize(definition.class)? {
            self.run(base)?;
        }

        self.enter(routine, callee, args)?;
        self.run(base)
    }

    /// Executes instructions until the frame above `base` returns, producing
    /// its return value.
    fn run(&mut self, base: usize) -> Result<Option<Value>> {
        let poll_interval = self.watchdog.poll_every().max(1);
        let mut counter = 0;

        loop {
            if counter % poll_interval == 0 && self.watchdog.should_stop() {
                return Err(Error::StoppedByWatchdog.locate(self.location()));
            }
            if counter >= self.config.instruction_limit {
                return Err(Error::InstructionLimitExceeded {
                    limit: self.config.instruction_limit,
                }
                .locate(self.location()));
            }
            counter += 1;
            self.executed += 1;

            if let Flow::Returned(value) = self.step()? {
                if self.frames.len() <= base {
                    return Ok(value);
                }
                if let Some(value) = value {
                    self.push(value.widened())?;
                }
            }
        }
    }

    /// Executes the instruction at the current instruction pointer.
    #[allow(clippy::too_many_lines)]
    fn step(&mut self) -> Result<Flow> {
        let program = Rc::clone(&self.program);
        let location = self.location();
        let frame = self.frame()?;
        let routine = program
            .routine(frame.routine)
            .ok_or_else(|| Error::NoSuchRoutine(frame.routine).locate(location))?;
        let instruction = routine.code.get(frame.pc).ok_or_else(|| {
            Error::InstructionPointerOutOfBounds {
                requested: frame.pc,
                available: routine.code.len(),
            }
            .locate(location)
        })?;
        trace!(%location, ?instruction, "executing");

        match instruction {
            Instruction::Push(value) => {
                self.push(value.widened())?;
                self.advance()?;
            }
            Instruction::Load(index) => {
                let value = self
                    .frame()?
                    .locals
                    .get(usize::from(*index))
                    .cloned()
                    .ok_or_else(|| Error::NoSuchLocal { index: *index }.locate(location))?;
                self.push(value)?;
                self.advance()?;
            }
            Instruction::Store(index) => {
                let value = self.pop()?;
                let slot = self
                    .frame_mut()?
                    .locals
                    .get_mut(usize::from(*index))
                    .ok_or_else(|| Error::NoSuchLocal { index: *index }.locate(location))?;
                *slot = value;
                self.advance()?;
            }
            Instruction::Pop => {
                self.pop()?;
                self.advance()?;
            }
            Instruction::Dup => {
                let value = self.pop()?;
                self.push(value.clone())?;
                self.push(value)?;
                self.advance()?;
            }
            Instruction::Add => self.arithmetic(Arithmetic::Add)?,
            Instruction::Sub => self.arithmetic(Arithmetic::Sub)?,
            Instruction::Mul => self.arithmetic(Arithmetic::Mul)?,
            Instruction::CmpEq => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Value::Int(i32::from(left == right)))?;
                self.advance()?;
            }
            Instruction::CmpLt => {
                let right = self.pop()?;
                let left = self.pop()?;
                let less = match (&left, &right) {
                    (Value::Float(l), Value::Float(r)) => l < r,
                    (Value::Double(l), Value::Double(r)) => l < r,
                    _ => match (left.as_integral(), right.as_integral()) {
                        (Some(l), Some(r)) => l < r,
                        _ => {
                            return Err(Error::IncompatibleOperands {
                                left:  left.to_string(),
                                right: right.to_string(),
                            }
                            .locate(location))
                        }
                    },
                };
                self.push(Value::Int(i32::from(less)))?;
                self.advance()?;
            }
            Instruction::Jump(target) => self.goto(*target as usize)?,
            Instruction::JumpIfZero(target) => {
                let value = self.pop()?;
                if matches!(
                    value,
                    Value::Int(0) | Value::Long(0) | Value::Bool(false) | Value::Null
                ) {
                    self.goto(*target as usize)?;
                } else {
                    self.advance()?;
                }
            }
            Instruction::GetField(field) => {
                let object = self.pop_object()?;
                self.read_field(FieldOwner::Object(object), field)?;
            }
            Instruction::PutField(field) => {
                let value = self.pop()?;
                let object = self.pop_object()?;
                self.write_field(FieldOwner::Object(object), field, value)?;
            }
            Instruction::GetStatic { class, field } => {
                if !self.initialize(*class)? {
                    self.read_field(FieldOwner::Class(*class), field)?;
                }
            }
            Instruction::PutStatic { class, field } => {
                if !self.initialize(*class)? {
                    let value = self.pop()?;
                    self.write_field(FieldOwner::Class(*class), field, value)?;
                }
            }
            Instruction::New(class) => {
                if !self.initialize(*class)? {
                    let definition = program
                        .class(*class)
                        .ok_or_else(|| Error::NoSuchClass(*class).locate(location))?;
                    let object = self.heap.allocate(*class, definition);
                    self.push(Value::Object(object))?;
                    self.advance()?;
                    self.notify(Event::Allocation)?;
                }
            }
            Instruction::NewArray => {
                let length = self.pop()?;
                let length = match length {
                    Value::Int(length) if length >= 0 => length.unsigned_abs() as usize,
                    other => {
                        return Err(Error::OperandType {
                            expected: FieldType::Int,
                            found:    other.to_string(),
                        }
                        .locate(location))
                    }
                };
                let array = self.heap.allocate_array(length);
                self.push(Value::Object(array))?;
                self.advance()?;
                self.notify(Event::Allocation)?;
            }
            Instruction::ArrayLoad => {
                let index = self.pop_int()?;
                let array = self.pop_object()?;
                let element = self.element(array, index)?.clone();
                self.push(element.widened())?;
                self.advance()?;
                self.notify(Event::ArrayAccess)?;
            }
            Instruction::ArrayStore => {
                let value = self.pop()?;
                let index = self.pop_int()?;
                let array = self.pop_object()?;
                *self.element(array, index)? = value;
                self.advance()?;
                self.notify(Event::ArrayAccess)?;
            }
            Instruction::Invoke(callee) => {
                let definition = program
                    .routine(*callee)
                    .ok_or_else(|| Error::NoSuchRoutine(*callee).locate(location))?;
                if definition.kind == RoutineKind::Static && self.initialize(definition.class)? {
                    return Ok(Flow::Continue);
                }

                let mut args = (0..definition.params.len())
                    .map(|_| self.pop())
                    .collect::<Result<Vec<_>>>()?;
                args.reverse();
                let receiver = if definition.has_receiver() {
                    Some(self.pop_object()?)
                } else {
                    None
                };

                self.advance()?;
                self.enter(*callee, receiver, args)?;
            }
            Instruction::InvokeNative {
                name,
                arity,
                returns,
            } => {
                let mut args = (0..*arity)
                    .map(|_| self.pop())
                    .collect::<Result<Vec<_>>>()?;
                args.reverse();
                self.advance()?;
                self.notify(Event::NativeCall { name: name.clone() })?;

                let result = self.native(name, &args).map_err(|e| e.locate(location))?;
                if let Some(tp) = returns {
                    self.push(result.unwrap_or_else(|| tp.default_value()).widened())?;
                }
            }
            Instruction::MonitorEnter => {
                self.pop_object()?;
                self.advance()?;
                self.notify(Event::Interruption(Interruption::ObjectLocked))?;
            }
            Instruction::MonitorExit => {
                self.pop_object()?;
                self.advance()?;
                self.notify(Event::Interruption(Interruption::ObjectUnlocked))?;
            }
            Instruction::Throw => {
                self.pop()?;
                self.notify(Event::Interruption(Interruption::ExceptionThrown))?;
                return Err(Error::UncaughtException.locate(location));
            }
            Instruction::Return => {
                let value = match routine.returns {
                    Some(tp) => {
                        let value = self.pop()?;
                        let narrowed = value.narrowed_to(tp).ok_or_else(|| {
                            Error::OperandType {
                                expected: tp,
                                found:    value.to_string(),
                            }
                            .locate(location)
                        })?;
                        Some(narrowed)
                    }
                    None => None,
                };

                self.notify(Event::Return {
                    routine: location.routine,
                    depth:   self.frames.len(),
                    value:   value.clone(),
                })?;
                self.frames.pop();
                return Ok(Flow::Returned(value));
            }
        }

        Ok(Flow::Continue)
    }

    /// Pushes a frame for `routine` and announces the call to the recorder.
    fn enter(
        &mut self,
        routine: RoutineId,
        callee: Option<ObjectId>,
        args: Vec<Value>,
    ) -> Result<()> {
        let program = Rc::clone(&self.program);
        let location = Location::new(routine, 0);
        let definition = program
            .routine(routine)
            .ok_or_else(|| Error::NoSuchRoutine(routine).locate(location))?;

        if self.frames.len() >= self.config.maximum_call_depth {
            return Err(Error::CallDepthExceeded {
                limit: self.config.maximum_call_depth,
            }
            .locate(self.location()));
        }
        if definition.params.len() != args.len() {
            return Err(Error::ArityMismatch {
                routine,
                expected: definition.params.len(),
                received: args.len(),
            }
            .locate(location));
        }
        let receiver = if definition.has_receiver() {
            Some(callee.ok_or_else(|| Error::MissingReceiver(routine).locate(location))?)
        } else {
            None
        };

        let args = args
            .iter()
            .zip(&definition.params)
            .map(|(value, tp)| {
                value.narrowed_to(*tp).ok_or_else(|| {
                    Error::OperandType {
                        expected: *tp,
                        found:    value.to_string(),
                    }
                    .locate(location)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut locals = receiver
            .map(Value::Object)
            .into_iter()
            .chain(args.iter().map(Value::widened))
            .collect_vec();
        if locals.len() < usize::from(definition.locals) {
            locals.resize(usize::from(definition.locals), Value::Null);
        }
        self.frames.push(Frame {
            routine,
            pc: 0,
            locals,
            stack: Vec::new(),
        });

        if self.recorder.is_none() {
            return Ok(());
        }
        let directive = self.notify(Event::Call(Invocation {
            routine,
            name: definition.name.clone(),
            kind: definition.kind,
            callee: receiver,
            args,
            params: definition.params.clone(),
            returns: definition.returns,
            depth: self.frames.len(),
            instruction_count: definition.code.len(),
        }))?;

        if directive == Directive::SkipToReturn {
            let target = definition
                .final_return()
                .ok_or_else(|| Error::NoReturnInstruction(routine).locate(location))?;
            trace!(routine = %definition.name, "skipping to return");
            self.goto(target)?;
        }

        Ok(())
    }

    /// Runs the initializer of `class` if it has one that has not yet run,
    /// returning whether it did.
    ///
    /// When this returns `true` an initializer frame has been pushed, and the
    /// current instruction must be executed again once it returns.
    fn initialize(&mut self, class: ClassId) -> Result<bool> {
        let Some(initializer) = self.program.class(class).and_then(|c| c.initializer) else {
            return Ok(false);
        };
        if !self.heap.mark_initialized(class) {
            return Ok(false);
        }

        debug!(%class, "initializing class");
        self.enter(initializer, None, vec![])?;
        Ok(true)
    }

    fn read_field(&mut self, owner: FieldOwner, field: &str) -> Result<()> {
        let location = self.location();
        let slot = self
            .heap
            .slot(owner, field)
            .cloned()
            .ok_or_else(|| {
                Error::Host(host::Error::NoSuchField {
                    owner,
                    field: field.to_string(),
                })
            })
            .locate(location)?;

        self.push(slot.value.widened())?;
        self.advance()?;
        self.notify(Event::FieldRead(FieldAccess {
            owner,
            field: field.to_string(),
            tp: slot.tp,
            value: slot.value,
        }))?;

        Ok(())
    }

    fn write_field(&mut self, owner: FieldOwner, field: &str, value: Value) -> Result<()> {
        let location = self.location();
        let tp = self
            .heap
            .slot(owner, field)
            .map(|slot| slot.tp)
            .ok_or_else(|| {
                Error::Host(host::Error::NoSuchField {
                    owner,
                    field: field.to_string(),
                })
            })
            .locate(location)?;
        let value = value.narrowed_to(tp).ok_or_else(|| {
            Error::OperandType {
                expected: tp,
                found:    value.to_string(),
            }
            .locate(location)
        })?;

        self.heap
            .store(owner, field, value.clone())
            .map_err(Error::Host)
            .locate(location)?;
        self.advance()?;
        self.notify(Event::FieldWrite(FieldAccess {
            owner,
            field: field.to_string(),
            tp,
            value,
        }))?;

        Ok(())
    }

    fn arithmetic(&mut self, operation: Arithmetic) -> Result<()> {
        let location = self.location();
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match (left, right, operation) {
            (Value::Int(l), Value::Int(r), _) => Value::Int(match operation {
                Arithmetic::Add => l.wrapping_add(r),
                Arithmetic::Sub => l.wrapping_sub(r),
                Arithmetic::Mul => l.wrapping_mul(r),
            }),
            (Value::Long(l), Value::Long(r), _) => Value::Long(match operation {
                Arithmetic::Add => l.wrapping_add(r),
                Arithmetic::Sub => l.wrapping_sub(r),
                Arithmetic::Mul => l.wrapping_mul(r),
            }),
            (Value::Float(l), Value::Float(r), _) => Value::Float(match operation {
                Arithmetic::Add => l + r,
                Arithmetic::Sub => l - r,
                Arithmetic::Mul => l * r,
            }),
            (Value::Double(l), Value::Double(r), _) => Value::Double(match operation {
                Arithmetic::Add => l + r,
                Arithmetic::Sub => l - r,
                Arithmetic::Mul => l * r,
            }),
            (Value::Str(l), Value::Str(r), Arithmetic::Add) => Value::Str(l + &r),
            (left, right, _) => {
                return Err(Error::IncompatibleOperands {
                    left:  left.to_string(),
                    right: right.to_string(),
                }
                .locate(location))
            }
        };

        self.push(result)?;
        self.advance()
    }

    /// Executes the native routine `name` on `args`.
    fn native(&mut self, name: &str, args: &[Value]) -> std::result::Result<Option<Value>, Error> {
        let simple_name = name.rsplit('.').next().unwrap_or(name);
        let result = match (simple_name, args) {
            ("println", args) => {
                self.output.push(args.iter().join(" "));
                None
            }
            ("hashCode", [Value::Object(object)]) => {
                Some(Value::Int(i32::try_from(object.0).unwrap_or(i32::MAX)))
            }
            ("min", [Value::Int(a), Value::Int(b)]) => Some(Value::Int(*a.min(b))),
            ("max", [Value::Int(a), Value::Int(b)]) => Some(Value::Int(*a.max(b))),
            ("currentTimeMillis" | "nanoTime", []) => {
                Some(Value::Long(i64::try_from(self.executed).unwrap_or(i64::MAX)))
            }
            _ => return Err(Error::UnknownNative(name.to_string())),
        };

        Ok(result)
    }

    /// Delivers `event` to the recorder, if there is one, with the innermost
    /// frame's operand stack as the target for pushed return values.
    fn notify(&mut self, event: Event) -> Result<Directive> {
        let location = self.location();
        let Some(recorder) = self.recorder.as_mut() else {
            return Ok(Directive::Continue);
        };
        let Some(frame) = self.frames.last_mut() else {
            return Ok(Directive::Continue);
        };

        let mut host = FrameHost::new(&mut self.heap, &mut frame.stack);
        recorder.on_event(&mut host, event).map_err(|error| {
            let error = match error {
                error::Error::Host(error) => Error::Host(error),
                other => Error::Recorder(other.to_string()),
            };
            error.locate(location)
        })
    }

    fn element(&mut self, array: ObjectId, index: i32) -> Result<&mut Value> {
        let location = self.location();
        let elements = &mut self
            .heap
            .object_mut(array)
            .ok_or_else(|| Error::Host(host::Error::NoSuchOwner(FieldOwner::Object(array))))
            .locate(location)?
            .elements;
        let length = elements.len();
        usize::try_from(index)
            .ok()
            .and_then(|i| elements.get_mut(i))
            .ok_or_else(|| Error::ArrayIndexOutOfBounds { index, length }.locate(location))
    }

    /// Gets the location of the instruction about to execute.
    fn location(&self) -> Location {
        self.frames.last().map_or_else(
            || Location::new(RoutineId(0), 0),
            |frame| Location::new(frame.routine, u32::try_from(frame.pc).unwrap_or(u32::MAX)),
        )
    }

    fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| Error::Host(host::Error::NoActiveFrame).locate(self.location()))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame> {
        let location = self.location();
        self.frames
            .last_mut()
            .ok_or_else(|| Error::Host(host::Error::NoActiveFrame).locate(location))
    }

    fn push(&mut self, value: Value) -> Result<()> {
        self.frame_mut()?.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        let location = self.location();
        self.frame_mut()?
            .stack
            .pop()
            .ok_or_else(|| Error::StackUnderflow.locate(location))
    }

    fn pop_int(&mut self) -> Result<i32> {
        match self.pop()? {
            Value::Int(value) => Ok(value),
            other => Err(Error::OperandType {
                expected: FieldType::Int,
                found:    other.to_string(),
            }
            .locate(self.location())),
        }
    }

    fn pop_object(&mut self) -> Result<ObjectId> {
        let value = self.pop()?;
        value.as_object().ok_or_else(|| {
            Error::OperandType {
                expected: FieldType::Reference,
                found:    value.to_string(),
            }
            .locate(self.location())
        })
    }

    fn advance(&mut self) -> Result<()> {
        self.frame_mut()?.pc += 1;
        Ok(())
    }

    fn goto(&mut self, target: usize) -> Result<()> {
        self.frame_mut()?.pc = target;
        Ok(())
    }

    /// Allocates an instance of `class` outside of any routine, with all of its
    /// fields holding their default values.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the class does not exist.
    pub fn allocate(&mut self, class: ClassId) -> host::Result<ObjectId> {
        let definition = self
            .program
            .class(class)
            .ok_or(host::Error::NoSuchOwner(FieldOwner::Class(class)))?;
        Ok(self.heap.allocate(class, definition))
    }

    /// Gets the program being executed.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Gets the heap of the virtual machine.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Gets the heap of the virtual machine.
    #[must_use]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Gets the recorder observing execution, if any.
    #[must_use]
    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    /// Gets the recorder observing execution, if any.
    #[must_use]
    pub fn recorder_mut(&mut self) -> Option<&mut Recorder> {
        self.recorder.as_mut()
    }

    /// Gets the total number of instructions executed so far.
    #[must_use]
    pub fn executed_instructions(&self) -> usize {
        self.executed
    }

    /// Gets the lines printed by the program so far.
    #[must_use]
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Gets the number of frames currently on the call stack.
    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Gets a reference to the virtual machine's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gets a reference to the virtual machine's watchdog instance.
    #[must_use]
    pub fn watchdog(&self) -> &DynWatchdog {
        &self.watchdog
    }
}

/// The configuration for the virtual machine instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum number of frames on the call stack.
    ///
    /// Defaults to [`DEFAULT_MAXIMUM_CALL_DEPTH`].
    pub maximum_call_depth: usize,

    /// The maximum number of instructions executed by a single call to
    /// [`VM::invoke`].
    ///
    /// Defaults to [`DEFAULT_INSTRUCTION_LIMIT`].
    pub instruction_limit: usize,
}

impl Config {
    /// Sets the `maximum_call_depth` config parameter to `value`.
    #[must_use]
    pub fn with_maximum_call_depth(mut self, value: usize) -> Self {
        self.maximum_call_depth = value;
        self
    }

    /// Sets the `instruction_limit` config parameter to `value`.
    #[must_use]
    pub fn with_instruction_limit(mut self, value: usize) -> Self {
        self.instruction_limit = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let maximum_call_depth = DEFAULT_MAXIMUM_CALL_DEPTH;
        let instruction_limit = DEFAULT_INSTRUCTION_LIMIT;
        Self {
            maximum_call_depth,
            instruction_limit,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{atomic::AtomicBool, Arc};

    use crate::{
        error::execution::Error,
        recorder::{self, event::RoutineKind, state::RecordingState, Recorder},
        value::{FieldOwner, FieldType, RoutineId, Value},
        vm::{
            instruction::Instruction,
            program::{ClassDef, Program, Routine},
            Config,
            VM,
        },
        watchdog::{FlagWatchdog, LazyWatchdog},
    };

    fn factorial_program() -> (Program, RoutineId) {
        let mut program = Program::new();
        let class = program.add_class(ClassDef::new("Math"));
        let fact = program.next_routine_id();
        program.add_routine(
            class,
            Routine::new("fact", RoutineKind::Static)
                .with_params(vec![FieldType::Int])
                .returning(FieldType::Int)
                .with_locals(1)
                .with_code(vec![
                    Instruction::Load(0),
                    Instruction::Push(Value::Int(1)),
                    Instruction::CmpLt,
                    Instruction::JumpIfZero(6),
                    Instruction::Push(Value::Int(1)),
                    Instruction::Return,
                    Instruction::Load(0),
                    Instruction::Load(0),
                    Instruction::Push(Value::Int(1)),
                    Instruction::Sub,
                    Instruction::Invoke(fact),
                    Instruction::Mul,
                    Instruction::Return,
                ]),
        );

        (program, fact)
    }

    fn counter_program() -> (Program, RoutineId) {
        let mut program = Program::new();
        let class = program.add_class(ClassDef::new("Counter").with_field("n", FieldType::Int));
        let bump = program.add_routine(
            class,
            Routine::new("bump", RoutineKind::Instance)
                .with_locals(1)
                .with_code(vec![
                    Instruction::Load(0),
                    Instruction::Load(0),
                    Instruction::GetField("n".into()),
                    Instruction::Push(Value::Int(1)),
                    Instruction::Add,
                    Instruction::PutField("n".into()),
                    Instruction::Return,
                ]),
        );

        (program, bump)
    }

    #[test]
    fn executes_recursive_routines() -> anyhow::Result<()> {
        let (program, fact) = factorial_program();
        let mut vm = VM::new(program, Config::default(), LazyWatchdog.in_rc());

        assert_eq!(vm.invoke(fact, None, vec![Value::Int(5)])?, Some(Value::Int(120)));
        assert_eq!(vm.invoke_by_name("Math.fact", None, vec![Value::Int(0)])?, Some(Value::Int(1)));
        assert_eq!(vm.call_depth(), 0);

        Ok(())
    }

    #[test]
    fn replays_recorded_invocations() -> anyhow::Result<()> {
        let (program, fact) = factorial_program();
        let recorder = Recorder::new(recorder::Config::default())?;
        let mut vm =
            VM::new(program, Config::default(), LazyWatchdog.in_rc()).with_recorder(recorder);

        assert_eq!(vm.invoke(fact, None, vec![Value::Int(5)])?, Some(Value::Int(120)));
        let after_first = vm.executed_instructions();

        assert_eq!(vm.invoke(fact, None, vec![Value::Int(5)])?, Some(Value::Int(120)));
        assert_eq!(vm.executed_instructions() - after_first, 1);

        let report = vm.recorder().map(Recorder::report);
        assert_eq!(report.map(|r| r.successful_matches), Some(1));

        Ok(())
    }

    #[test]
    fn replays_field_writes() -> anyhow::Result<()> {
        let (program, bump) = counter_program();
        let class = program.class_id("Counter").ok_or(anyhow::anyhow!("no class"))?;
        let recorder = Recorder::new(recorder::Config::default())?;
        let mut vm =
            VM::new(program, Config::default(), LazyWatchdog.in_rc()).with_recorder(recorder);
        let counter = vm.allocate(class)?;
        let owner = FieldOwner::Object(counter);

        vm.invoke(bump, Some(counter), vec![])?;
        assert_eq!(vm.heap().slot(owner, "n").map(|s| s.value.clone()), Some(Value::Int(1)));

        vm.heap_mut().store(owner, "n", Value::Int(0))?;
        let before = vm.executed_instructions();
        vm.invoke(bump, Some(counter), vec![])?;

        assert_eq!(vm.executed_instructions() - before, 1);
        assert_eq!(vm.heap().slot(owner, "n").map(|s| s.value.clone()), Some(Value::Int(1)));

        Ok(())
    }

    #[test]
    fn instance_routines_require_a_receiver() {
        let (program, bump) = counter_program();
        let mut vm = VM::new(program, Config::default(), LazyWatchdog.in_rc());

        let error = vm.invoke(bump, None, vec![]).unwrap_err();
        assert_eq!(error.payload, Error::MissingReceiver(bump));
    }

    #[test]
    fn stops_when_the_watchdog_says_so() {
        let (program, fact) = factorial_program();
        let watchdog = FlagWatchdog::new(Arc::new(AtomicBool::new(true)))
            .polling_every(1)
            .in_rc();
        let mut vm = VM::new(program, Config::default(), watchdog);

        let error = vm.invoke(fact, None, vec![Value::Int(3)]).unwrap_err();
        assert_eq!(error.payload, Error::StoppedByWatchdog);
        assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn runs_class_initializers_once() -> anyhow::Result<()> {
        let mut program = Program::new();
        let class =
            program.add_class(ClassDef::new("Limits").with_static_field("max", FieldType::Int));
        program.add_routine(
            class,
            Routine::new("<clinit>", RoutineKind::ClassInitializer).with_code(vec![
                Instruction::Push(Value::string("initialized")),
                Instruction::InvokeNative {
                    name:    "System.println".into(),
                    arity:   1,
                    returns: None,
                },
                Instruction::Push(Value::Int(7)),
                Instruction::PutStatic {
                    class,
                    field: "max".into(),
                },
                Instruction::Return,
            ]),
        );
        let max = program.add_routine(
            class,
            Routine::new("max", RoutineKind::Static)
                .returning(FieldType::Int)
                .with_code(vec![
                    Instruction::GetStatic {
                        class,
                        field: "max".into(),
                    },
                    Instruction::Return,
                ]),
        );
        let mut vm = VM::new(program, Config::default(), LazyWatchdog.in_rc());

        assert_eq!(vm.invoke(max, None, vec![])?, Some(Value::Int(7)));
        assert_eq!(vm.invoke(max, None, vec![])?, Some(Value::Int(7)));
        assert_eq!(vm.output(), ["\"initialized\""]);

        Ok(())
    }

    #[test]
    fn uncaught_exceptions_are_errors() {
        let mut program = Program::new();
        let class = program.add_class(ClassDef::new("Failing"));
        let fail = program.add_routine(
            class,
            Routine::new("fail", RoutineKind::Static)
                .with_code(vec![Instruction::Push(Value::Null), Instruction::Throw]),
        );
        let mut vm = VM::new(program, Config::default(), LazyWatchdog.in_rc());

        let error = vm.invoke(fail, None, vec![]).unwrap_err();
        assert_eq!(error.payload, Error::UncaughtException);
        assert_eq!(error.location.offset, 1);
    }

    #[test]
    fn failed_invocations_discard_their_recordings() -> anyhow::Result<()> {
        let mut program = Program::new();
        let class = program.add_class(ClassDef::new("Forever"));
        let spin = program.next_routine_id();
        program.add_routine(
            class,
            Routine::new("spin", RoutineKind::Static)
                .with_code(vec![Instruction::Invoke(spin), Instruction::Return]),
        );
        let recorder = Recorder::new(recorder::Config::default())?;
        let mut vm = VM::new(
            program,
            Config::default().with_maximum_call_depth(8),
            LazyWatchdog.in_rc(),
        )
        .with_recorder(recorder);

        let error = vm.invoke(spin, None, vec![]).unwrap_err();
        assert_eq!(error.payload, Error::CallDepthExceeded { limit: 8 });
        assert_eq!(vm.call_depth(), 0);
        assert_eq!(vm.recorder().map(Recorder::active_recordings), Some(0));
        assert_eq!(
            vm.recorder().map(|r| r.state(spin)),
            Some(RecordingState::Blacklisted)
        );

        Ok(())
    }

    #[test]
    fn instruction_limit_is_enforced() {
        let mut program = Program::new();
        let class = program.add_class(ClassDef::new("Loop"));
        let forever = program.add_routine(
            class,
            Routine::new("forever", RoutineKind::Static).with_code(vec![Instruction::Jump(0)]),
        );
        let mut vm = VM::new(
            program,
            Config::default().with_instruction_limit(50),
            LazyWatchdog.in_rc(),
        );

        let error = vm.invoke(forever, None, vec![]).unwrap_err();
        assert_eq!(error.payload, Error::InstructionLimitExceeded { limit: 50 });
    }
}
