//! End-to-end coverage of the planner/executor pipeline through the public
//! API only, exercising the worked examples from the design notes: a
//! sequential run that fits, one that splits, non-divisible subtrees that
//! merge or split depending on whether they fit together, a packer leaf
//! draining to completion, and an executor failure cancelling its tail.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use txplan_core::{
    message_packer, non_divisible_sequential, parallel, sequential, single, Cancellation,
    ExecuteHooks, ExecuteOutcome, ExecutionContext, Executor, InstructionPlan, LedgerOps,
    PlannerHooks, PlannerLimits,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Ix {
    tag: String,
    size: u32,
}

impl Ix {
    fn new(tag: &str, size: u32) -> Self {
        Self {
            tag: tag.to_string(),
            size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Msg(Vec<Ix>);

#[derive(Debug, Clone, Copy, Default, thiserror::Error)]
#[error("hook failed")]
struct HookErr;

#[derive(Debug, Clone, Copy, Default)]
struct Ledger;

impl LedgerOps for Ledger {
    type Instruction = Ix;
    type Message = Msg;
    type Signature = u64;
    type HookError = HookErr;

    fn measure(&self, message: &Self::Message) -> u32 {
        1 + message.0.iter().map(|i| i.size).sum::<u32>()
    }

    fn append(&self, instructions: &[Self::Instruction], message: &Self::Message) -> Self::Message {
        let mut out = message.0.clone();
        out.extend_from_slice(instructions);
        Msg(out)
    }
}

struct NoopHooks;

#[async_trait]
impl PlannerHooks<Ledger> for NoopHooks {
    async fn create_message(&self, _cancellation: &Cancellation) -> Result<Msg, HookErr> {
        Ok(Msg::default())
    }
}

struct RecordingExecuteHooks {
    dispatched: Mutex<Vec<String>>,
    fail_tag: Option<&'static str>,
}

impl RecordingExecuteHooks {
    fn new(fail_tag: Option<&'static str>) -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            fail_tag,
        }
    }
}

#[async_trait]
impl ExecuteHooks<Ledger> for RecordingExecuteHooks {
    async fn execute_message(
        &self,
        _context: &mut ExecutionContext,
        message: &Msg,
        _cancellation: &Cancellation,
    ) -> Result<ExecuteOutcome<Ledger>, HookErr> {
        let tag = message.0.first().map(|i| i.tag.clone()).unwrap_or_default();
        self.dispatched.lock().unwrap().push(tag.clone());
        if self.fail_tag == Some(tag.as_str()) {
            Err(HookErr)
        } else {
            Ok(ExecuteOutcome::Signature(1))
        }
    }
}

// Budget B chosen so tx_size_limit = 1 (overhead) + 1 (shortU16 reserve) + b.
fn planner(b: u32) -> txplan_core::Planner<Ledger> {
    txplan_core::Planner::with_limits(
        Ledger,
        PlannerLimits {
            tx_size_limit: b + 2,
            ..PlannerLimits::default()
        },
    )
}

#[tokio::test]
async fn sequential_that_fits_collapses_to_one_message() {
    let plan = sequential::<Ledger>(vec![single(Ix::new("a", 50)), single(Ix::new("b", 50))]);
    let tx_plan = planner(100)
        .plan(plan, &NoopHooks, &Cancellation::new())
        .await
        .unwrap();
    assert!(tx_plan.is_single());

    let executor = Executor::<Ledger>::new();
    let hooks = RecordingExecuteHooks::new(None);
    let result = executor.execute(&tx_plan, &hooks, &Cancellation::new()).await.unwrap();
    assert!(result.summarize());
    assert_eq!(*hooks.dispatched.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn oversized_sequential_splits_across_transactions_in_order() {
    let plan = sequential::<Ledger>(vec![
        single(Ix::new("a", 60)),
        single(Ix::new("b", 50)),
        single(Ix::new("c", 50)),
    ]);
    let tx_plan = planner(100)
        .plan(plan, &NoopHooks, &Cancellation::new())
        .await
        .unwrap();

    let tags: Vec<String> = tx_plan
        .flatten()
        .into_iter()
        .flat_map(|m| m.0.iter().map(|i| i.tag.clone()))
        .collect();
    assert_eq!(tags, vec!["a", "b", "c"]);
    // a alone in one message, b+c merged into the next
    assert_eq!(tx_plan.flatten().len(), 2);

    let executor = Executor::<Ledger>::new();
    let hooks = RecordingExecuteHooks::new(None);
    executor.execute(&tx_plan, &hooks, &Cancellation::new()).await.unwrap();
    assert_eq!(*hooks.dispatched.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn non_divisible_branches_merge_when_they_fit_together() {
    let plan = parallel::<Ledger>(vec![
        non_divisible_sequential(vec![single(Ix::new("a", 25)), single(Ix::new("b", 25))]),
        non_divisible_sequential(vec![single(Ix::new("c", 25)), single(Ix::new("d", 25))]),
    ]);
    let tx_plan = planner(100)
        .plan(plan, &NoopHooks, &Cancellation::new())
        .await
        .unwrap();
    assert!(tx_plan.is_single());
    let tags: Vec<String> = tx_plan
        .flatten()
        .into_iter()
        .flat_map(|m| m.0.iter().map(|i| i.tag.clone()))
        .collect();
    assert_eq!(tags, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn non_divisible_branches_that_do_not_fit_together_stay_separate() {
    let plan = parallel::<Ledger>(vec![
        non_divisible_sequential(vec![single(Ix::new("a", 33)), single(Ix::new("b", 33))]),
        non_divisible_sequential(vec![single(Ix::new("c", 33)), single(Ix::new("d", 33))]),
    ]);
    let tx_plan = planner(100)
        .plan(plan, &NoopHooks, &Cancellation::new())
        .await
        .unwrap();
    assert_eq!(tx_plan.flatten().len(), 2);

    let executor = Executor::<Ledger>::new();
    let hooks = RecordingExecuteHooks::new(None);
    let result = executor.execute(&tx_plan, &hooks, &Cancellation::new()).await.unwrap();
    assert!(result.summarize());
    // both branches dispatched, neither forced to wait on the other
    let mut dispatched = hooks.dispatched.lock().unwrap().clone();
    dispatched.sort();
    assert_eq!(dispatched, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn message_packer_leaf_drains_across_as_many_messages_as_needed() {
    let factory = txplan_core::plan::packer::LinearBytePackerFactory::<Ledger>::new(37, |offset, len| {
        Ix::new(&format!("chunk@{offset}"), len as u32)
    });
    let plan: InstructionPlan<Ledger> = message_packer(Arc::new(factory));
    let tx_plan = planner(10)
        .plan(plan, &NoopHooks, &Cancellation::new())
        .await
        .unwrap();

    let total: u32 = tx_plan
        .flatten()
        .into_iter()
        .flat_map(|m| m.0.iter().map(|i| i.size))
        .sum();
    assert_eq!(total, 37);
    assert!(tx_plan.flatten().iter().all(|m| Ledger.measure(m) <= 12));
}

#[tokio::test]
async fn executor_failure_cancels_the_rest_of_its_sequential_chain() {
    let plan = sequential::<Ledger>(vec![
        single(Ix::new("a", 1)),
        single(Ix::new("b", 1)),
        single(Ix::new("c", 1)),
    ]);
    // Budget of 1 leaves no room for a second size-1 instruction to join an
    // already size-1 message, forcing each onto its own transaction so the
    // per-node executor statuses below are actually distinct.
    let tx_plan = planner(1)
        .plan(plan, &NoopHooks, &Cancellation::new())
        .await
        .unwrap();
    assert_eq!(tx_plan.flatten().len(), 3);

    let executor = Executor::<Ledger>::new();
    let hooks = RecordingExecuteHooks::new(Some("b"));
    let err = executor
        .execute(&tx_plan, &hooks, &Cancellation::new())
        .await
        .unwrap_err();

    let tree = err.result_tree().expect("failure preserves the result tree");
    let statuses: Vec<_> = tree.flatten_result().into_iter().map(|n| n.status().unwrap()).collect();
    assert!(statuses[0].is_successful());
    assert!(statuses[1].is_failed());
    assert!(statuses[2].is_canceled());
    // "c" never dispatched once "b" failed
    assert_eq!(*hooks.dispatched.lock().unwrap(), vec!["a", "b"]);
}
