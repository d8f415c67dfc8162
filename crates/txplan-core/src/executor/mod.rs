//! Walks a [`TransactionPlan`] and dispatches each message through
//! caller-supplied hooks, producing a parallel-shaped
//! [`TransactionPlanResult`] (spec §4.5).

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, instrument, trace, warn};

use crate::cancellation::Cancellation;
use crate::error::{PlanError, PlanResult};
use crate::hooks::{strip_reserved_keys, ExecuteHooks, ExecuteOutcome, ExecutionContext};
use crate::ledger::LedgerOps;
use crate::result::{ExecutionStatus, TransactionPlanResult};
use crate::transaction_plan::TransactionPlan;

/// Dispatches a [`TransactionPlan`] via a set of [`ExecuteHooks`].
pub struct Executor<L: LedgerOps> {
    _marker: std::marker::PhantomData<L>,
}

impl<L: LedgerOps> Default for Executor<L> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<L: LedgerOps> Executor<L> {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip_all)]
    pub async fn execute<H>(
        &self,
        plan: &TransactionPlan<L>,
        hooks: &H,
        cancellation: &Cancellation,
    ) -> PlanResult<TransactionPlanResult<L>, L>
    where
        H: ExecuteHooks<L>,
    {
        if plan.find(&|n| n.is_non_divisible_sequential()).is_some() {
            return Err(PlanError::NonDivisibleTransactionPlansNotSupported);
        }

        let result = execute_node(hooks, cancellation, plan).await;

        if result.summarize() {
            Ok(result)
        } else {
            warn!("transaction plan execution failed, surfacing partial result tree");
            Err(result.into_execution_failure(cancellation))
        }
    }
}

type BoxResultFuture<'a, L> = Pin<Box<dyn Future<Output = TransactionPlanResult<L>> + Send + 'a>>;

/// Recursive dispatch. Infallible at the node level: hook errors are
/// captured as [`ExecutionStatus::Failed`] rather than unwound, since a
/// single leaf failing must not stop its independent `Parallel` siblings.
fn execute_node<'a, L, H>(
    hooks: &'a H,
    cancellation: &'a Cancellation,
    node: &'a TransactionPlan<L>,
) -> BoxResultFuture<'a, L>
where
    L: LedgerOps,
    H: ExecuteHooks<L>,
{
    Box::pin(async move {
        match node {
            TransactionPlan::Single(message) => execute_single(hooks, cancellation, message).await,
            TransactionPlan::Sequential { children, divisible } => {
                let mut results = Vec::with_capacity(children.len());
                let mut tail_canceled = false;
                for child in children {
                    if tail_canceled || cancellation.is_cancelled() {
                        results.push(cancel_subtree(child));
                        continue;
                    }
                    let result = execute_node(hooks, cancellation, child).await;
                    if !result.summarize() {
                        debug!("sequential child failed, cancelling remaining tail");
                        tail_canceled = true;
                    }
                    results.push(result);
                }
                TransactionPlanResult::SequentialResult {
                    children: results,
                    divisible: *divisible,
                }
            }
            TransactionPlan::Parallel(children) => {
                let futures = children.iter().map(|child| execute_node(hooks, cancellation, child));
                let results = futures::future::join_all(futures).await;
                trace!(count = results.len(), "parallel children joined");
                TransactionPlanResult::ParallelResult(results)
            }
        }
    })
}

async fn execute_single<L, H>(
    hooks: &H,
    cancellation: &Cancellation,
    message: &L::Message,
) -> TransactionPlanResult<L>
where
    L: LedgerOps,
    H: ExecuteHooks<L>,
{
    if cancellation.is_cancelled() {
        return TransactionPlanResult::SingleResult {
            message: message.clone(),
            status: ExecutionStatus::Canceled,
        };
    }

    trace!("dispatching single message");
    let mut context: ExecutionContext = ExecutionContext::new();
    let status = match hooks.execute_message(&mut context, message, cancellation).await {
        Ok(ExecuteOutcome::Signature(signature)) => ExecutionStatus::Successful {
            signature,
            transaction: None,
            context: strip_reserved_keys(context),
        },
        Ok(ExecuteOutcome::SignedTransaction { signature, transaction }) => ExecutionStatus::Successful {
            signature,
            transaction: Some(transaction),
            context: strip_reserved_keys(context),
        },
        Err(err) => {
            let signature = context
                .contains_key("transaction")
                .then(|| hooks.derive_signature_from_context(&context))
                .flatten();
            ExecutionStatus::Failed {
                error: err.to_string(),
                signature,
                context: strip_reserved_keys(context),
            }
        }
    };

    TransactionPlanResult::SingleResult {
        message: message.clone(),
        status,
    }
}

fn cancel_subtree<L: LedgerOps>(node: &TransactionPlan<L>) -> TransactionPlanResult<L> {
    match node {
        TransactionPlan::Single(message) => TransactionPlanResult::SingleResult {
            message: message.clone(),
            status: ExecutionStatus::Canceled,
        },
        TransactionPlan::Parallel(children) => {
            TransactionPlanResult::ParallelResult(children.iter().map(cancel_subtree).collect())
        }
        TransactionPlan::Sequential { children, divisible } => TransactionPlanResult::SequentialResult {
            children: children.iter().map(cancel_subtree).collect(),
            divisible: *divisible,
        },
    }
}
