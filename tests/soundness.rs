//! This module is an integration test that checks the soundness of replay:
//! for arbitrary sequences of invocations, a virtual machine that replays
//! summaries must end up in exactly the same state, and produce exactly the
//! same results, as one that executes everything for real.
#![cfg(test)]

use execution_summarizer::{
    recorder,
    value::{ObjectId, Value},
    vm::VM,
};
use proptest::{prelude::*, test_runner::TestCaseError};

mod common;

/// A single step of a generated scenario.
#[derive(Clone, Debug)]
enum Step {
    Deposit { first: bool, amount: i32 },
    Transfer { first: bool, amount: i32 },
    Audit { first: bool },
    Reset,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (any::<bool>(), -2..4i32).prop_map(|(first, amount)| Step::Deposit { first, amount }),
        (any::<bool>(), -2..4i32).prop_map(|(first, amount)| Step::Transfer { first, amount }),
        any::<bool>().prop_map(|first| Step::Audit { first }),
        Just(Step::Reset),
    ]
}

/// A virtual machine holding two accounts.
struct Bank {
    vm:       VM,
    accounts: [ObjectId; 2],
    initial:  [i32; 2],
}

impl Bank {
    fn new(mut vm: VM, initial: [i32; 2]) -> anyhow::Result<Self> {
        let (_, account) = common::account_program();
        let first = common::new_object(&mut vm, account.class, &[("balance", Value::Int(initial[0]))])?;
        let second =
            common::new_object(&mut vm, account.class, &[("balance", Value::Int(initial[1]))])?;

        Ok(Self {
            vm,
            accounts: [first, second],
            initial,
        })
    }

    fn pick(&self, first: bool) -> (ObjectId, ObjectId) {
        if first {
            (self.accounts[0], self.accounts[1])
        } else {
            (self.accounts[1], self.accounts[0])
        }
    }

    fn run(&mut self, step: &Step) -> anyhow::Result<Option<Value>> {
        let (_, account) = common::account_program();
        let result = match *step {
            Step::Deposit { first, amount } => {
                let (target, _) = self.pick(first);
                self.vm
                    .invoke(account.deposit, Some(target), vec![Value::Int(amount)])?
            }
            Step::Transfer { first, amount } => {
                let (from, to) = self.pick(first);
                self.vm.invoke(
                    account.transfer,
                    Some(from),
                    vec![Value::Object(to), Value::Int(amount)],
                )?
            }
            Step::Audit { first } => {
                let (target, _) = self.pick(first);
                self.vm.invoke(account.audit, Some(target), vec![])?
            }
            Step::Reset => {
                for (object, balance) in self.accounts.into_iter().zip(self.initial) {
                    let owner = execution_summarizer::value::FieldOwner::Object(object);
                    self.vm.heap_mut().store(owner, "balance", Value::Int(balance))?;
                    self.vm.heap_mut().store(owner, "deposits", Value::Int(0))?;
                }
                None
            }
        };

        Ok(result)
    }

    fn state(&self) -> anyhow::Result<Vec<Value>> {
        let mut state = Vec::new();
        for object in self.accounts {
            state.push(common::field_of(&self.vm, object, "balance")?);
            state.push(common::field_of(&self.vm, object, "deposits")?);
        }

        Ok(state)
    }
}

/// Runs `steps` on both a plain and a recording virtual machine, returning the
/// results and states of each after every step.
#[allow(clippy::type_complexity)]
fn run_both(
    initial: [i32; 2],
    steps: &[Step],
) -> anyhow::Result<(Vec<(Option<Value>, Vec<Value>)>, Vec<(Option<Value>, Vec<Value>)>, usize)> {
    let (program, _) = common::account_program();
    let mut plain = Bank::new(common::plain_vm(program.clone()), initial)?;
    let mut replaying = Bank::new(
        common::recording_vm(program, recorder::Config::default())?,
        initial,
    )?;

    let mut expected = Vec::new();
    let mut actual = Vec::new();
    for step in steps {
        expected.push((plain.run(step)?, plain.state()?));
        actual.push((replaying.run(step)?, replaying.state()?));
    }
    let replays = common::recorder_of(&replaying.vm)?.report().successful_matches;

    Ok((expected, actual, replays))
}

proptest! {
    #[test]
    fn replay_is_indistinguishable_from_execution(
        initial in prop::array::uniform2(0..3i32),
        steps in prop::collection::vec(step(), 1..40),
    ) {
        let (expected, actual, _) =
            run_both(initial, &steps).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(expected, actual);
    }
}

#[test]
fn repeated_scenarios_are_replayed() -> anyhow::Result<()> {
    let steps = [
        Step::Deposit {
            first:  true,
            amount: 2,
        },
        Step::Transfer {
            first:  false,
            amount: 1,
        },
        Step::Audit { first: true },
        Step::Reset,
        Step::Deposit {
            first:  true,
            amount: 2,
        },
        Step::Transfer {
            first:  false,
            amount: 1,
        },
        Step::Audit { first: true },
    ];

    let (expected, actual, replays) = run_both([1, 1], &steps)?;
    assert_eq!(expected, actual);
    assert_eq!(replays, 3);

    Ok(())
}
