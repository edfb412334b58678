//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use anyhow::anyhow;
use execution_summarizer::{
    recorder::{self, event::RoutineKind, Recorder},
    value::{ClassId, FieldOwner, FieldType, ObjectId, RoutineId, Value},
    vm::{
        self,
        instruction::Instruction,
        program::{ClassDef, Program, Routine},
        VM,
    },
    watchdog::LazyWatchdog,
};

/// The routines of the account program built by [`account_program`].
#[allow(unused)] // It is actually
#[derive(Clone, Copy, Debug)]
pub struct Account {
    pub class:    ClassId,
    pub deposit:  RoutineId,
    pub transfer: RoutineId,
    pub audit:    RoutineId,
}

/// Builds a program with an `Account` class holding an `int balance` and an
/// `int deposits` count, together with the routines operating on it.
///
/// - `Account.deposit(int amount) -> int` adds `amount` to the balance when it
///   is positive, counts the deposit, and returns the new balance.
/// - `Account.transfer(Account to, int amount) -> int` deposits `amount` into
///   `to` and withdraws it from the receiver, returning the receiver's balance.
/// - `Account.audit() -> int` returns the balance without changing anything.
#[allow(unused)] // It is actually
pub fn account_program() -> (Program, Account) {
    let mut program = Program::new();
    let class = program.add_class(
        ClassDef::new("Account")
            .with_field("balance", FieldType::Int)
            .with_field("deposits", FieldType::Int),
    );

    let deposit = program.add_routine(
        class,
        Routine::new("deposit", RoutineKind::Instance)
            .with_params(vec![FieldType::Int])
            .returning(FieldType::Int)
            .with_locals(2)
            .with_code(vec![
                // if (0 < amount)
                Instruction::Push(Value::Int(0)),
                Instruction::Load(1),
                Instruction::CmpLt,
                Instruction::JumpIfZero(16),
                // this.balance = this.balance + amount
                Instruction::Load(0),
                Instruction::Load(0),
                Instruction::GetField("balance".into()),
                Instruction::Load(1),
                Instruction::Add,
                Instruction::PutField("balance".into()),
                // this.deposits = this.deposits + 1
                Instruction::Load(0),
                Instruction::Load(0),
                Instruction::GetField("deposits".into()),
                Instruction::Push(Value::Int(1)),
                Instruction::Add,
                Instruction::PutField("deposits".into()),
                // return this.balance
                Instruction::Load(0),
                Instruction::GetField("balance".into()),
                Instruction::Return,
            ]),
    );

    let transfer = program.add_routine(
        class,
        Routine::new("transfer", RoutineKind::Instance)
            .with_params(vec![FieldType::Reference, FieldType::Int])
            .returning(FieldType::Int)
            .with_locals(3)
            .with_code(vec![
                // to.deposit(amount)
                Instruction::Load(1),
                Instruction::Load(2),
                Instruction::Invoke(deposit),
                Instruction::Pop,
                // this.balance = this.balance - amount
                Instruction::Load(0),
                Instruction::Load(0),
                Instruction::GetField("balance".into()),
                Instruction::Load(2),
                Instruction::Sub,
                Instruction::PutField("balance".into()),
                // return this.balance
                Instruction::Load(0),
                Instruction::GetField("balance".into()),
                Instruction::Return,
            ]),
    );

    let audit = program.add_routine(
        class,
        Routine::new("audit", RoutineKind::Instance)
            .returning(FieldType::Int)
            .with_locals(1)
            .with_code(vec![
                Instruction::Load(0),
                Instruction::GetField("balance".into()),
                Instruction::Return,
            ]),
    );

    let account = Account {
        class,
        deposit,
        transfer,
        audit,
    };
    (program, account)
}

/// Constructs a virtual machine for `program` with the default configuration
/// and no recorder.
#[allow(unused)] // It is actually
pub fn plain_vm(program: Program) -> VM {
    VM::new(program, vm::Config::default(), LazyWatchdog.in_rc())
}

/// Constructs a virtual machine for `program` observed by a recorder using
/// `config`.
#[allow(unused)] // It is actually
pub fn recording_vm(program: Program, config: recorder::Config) -> anyhow::Result<VM> {
    let recorder = Recorder::new(config)?;
    Ok(plain_vm(program).with_recorder(recorder))
}

/// Gets the recorder of `vm`, failing if it has none.
#[allow(unused)] // It is actually
pub fn recorder_of(vm: &VM) -> anyhow::Result<&Recorder> {
    vm.recorder().ok_or(anyhow!("The virtual machine has no recorder"))
}

/// Allocates an instance of `class` and initializes its `fields`.
#[allow(unused)] // It is actually
pub fn new_object(vm: &mut VM, class: ClassId, fields: &[(&str, Value)]) -> anyhow::Result<ObjectId> {
    let object = vm.allocate(class)?;
    for (name, value) in fields {
        vm.heap_mut()
            .store(FieldOwner::Object(object), name, value.clone())?;
    }

    Ok(object)
}

/// Reads the current value of the field `name` on `object`.
#[allow(unused)] // It is actually
pub fn field_of(vm: &VM, object: ObjectId, name: &str) -> anyhow::Result<Value> {
    vm.heap()
        .slot(FieldOwner::Object(object), name)
        .map(|slot| slot.value.clone())
        .ok_or(anyhow!("{object} has no field named {name}"))
}
