//! Executor output tree (spec §3.3, §4.5, §4.6): the parallel-shaped
//! result of walking a [`TransactionPlan`](crate::transaction_plan::TransactionPlan).

use crate::cancellation::Cancellation;
use crate::error::{PlanError, PlanResult};
use crate::hooks::ExecutionContext;
use crate::ledger::LedgerOps;

/// Outcome of dispatching one message.
pub enum ExecutionStatus<L: LedgerOps> {
    Successful {
        signature: L::Signature,
        transaction: Option<L::Message>,
        context: ExecutionContext,
    },
    Failed {
        error: String,
        /// Derived from `context`'s reserved `transaction` entry when the
        /// callback had set one before erroring (spec §4.5 point 2).
        signature: Option<L::Signature>,
        context: ExecutionContext,
    },
    /// Never dispatched, because an earlier sibling in the same
    /// `Sequential` subtree failed or a cancellation fired first.
    Canceled,
}

/// Hand-written so the bound stays `L: LedgerOps` rather than derive's
/// default `L: Clone` (see the matching note on [`PlanError`](crate::error::PlanError)'s
/// `Debug` impl).
impl<L: LedgerOps> Clone for ExecutionStatus<L> {
    fn clone(&self) -> Self {
        match self {
            Self::Successful {
                signature,
                transaction,
                context,
            } => Self::Successful {
                signature: signature.clone(),
                transaction: transaction.clone(),
                context: context.clone(),
            },
            Self::Failed {
                error,
                signature,
                context,
            } => Self::Failed {
                error: error.clone(),
                signature: signature.clone(),
                context: context.clone(),
            },
            Self::Canceled => Self::Canceled,
        }
    }
}

impl<L: LedgerOps> std::fmt::Debug for ExecutionStatus<L>
where
    L::Signature: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Successful {
                signature,
                transaction,
                context,
            } => f
                .debug_struct("Successful")
                .field("signature", signature)
                .field("transaction_present", &transaction.is_some())
                .field("context", context)
                .finish(),
            Self::Failed {
                error,
                signature,
                context,
            } => f
                .debug_struct("Failed")
                .field("error", error)
                .field("signature", signature)
                .field("context", context)
                .finish(),
            Self::Canceled => f.write_str("Canceled"),
        }
    }
}

impl<L: LedgerOps> ExecutionStatus<L> {
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Successful { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// One node of the result tree; shape mirrors the
/// [`TransactionPlan`](crate::transaction_plan::TransactionPlan) it was
/// produced from.
pub enum TransactionPlanResult<L: LedgerOps> {
    SingleResult {
        message: L::Message,
        status: ExecutionStatus<L>,
    },
    ParallelResult(Vec<TransactionPlanResult<L>>),
    SequentialResult {
        children: Vec<TransactionPlanResult<L>>,
        divisible: bool,
    },
}

impl<L: LedgerOps> Clone for TransactionPlanResult<L> {
    fn clone(&self) -> Self {
        match self {
            Self::SingleResult { message, status } => Self::SingleResult {
                message: message.clone(),
                status: status.clone(),
            },
            Self::ParallelResult(children) => Self::ParallelResult(children.clone()),
            Self::SequentialResult { children, divisible } => Self::SequentialResult {
                children: children.clone(),
                divisible: *divisible,
            },
        }
    }
}

impl<L: LedgerOps> std::fmt::Debug for TransactionPlanResult<L>
where
    L::Message: std::fmt::Debug,
    L::Signature: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleResult { message, status } => f
                .debug_struct("SingleResult")
                .field("message", message)
                .field("status", status)
                .finish(),
            Self::ParallelResult(children) => f.debug_tuple("ParallelResult").field(children).finish(),
            Self::SequentialResult { children, divisible } => f
                .debug_struct("SequentialResult")
                .field("children", children)
                .field("divisible", divisible)
                .finish(),
        }
    }
}

impl<L: LedgerOps> TransactionPlanResult<L> {
    fn children(&self) -> &[TransactionPlanResult<L>] {
        match self {
            Self::ParallelResult(children) => children,
            Self::SequentialResult { children, .. } => children,
            Self::SingleResult { .. } => &[],
        }
    }

    pub fn find_result(
        &self,
        predicate: &dyn Fn(&TransactionPlanResult<L>) -> bool,
    ) -> Option<&TransactionPlanResult<L>> {
        if predicate(self) {
            return Some(self);
        }
        for child in self.children() {
            if let Some(found) = child.find_result(predicate) {
                return Some(found);
            }
        }
        None
    }

    pub fn every_result(&self, predicate: &dyn Fn(&TransactionPlanResult<L>) -> bool) -> bool {
        if !predicate(self) {
            return false;
        }
        self.children().iter().all(|c| c.every_result(predicate))
    }

    /// Bottom-up rewrite, mirroring `InstructionPlan::transform`.
    pub fn transform_result(
        self,
        fn_: &dyn Fn(TransactionPlanResult<L>) -> TransactionPlanResult<L>,
    ) -> TransactionPlanResult<L> {
        let rebuilt = match self {
            Self::SingleResult { .. } => self,
            Self::ParallelResult(children) => {
                Self::ParallelResult(children.into_iter().map(|c| c.transform_result(fn_)).collect())
            }
            Self::SequentialResult { children, divisible } => Self::SequentialResult {
                children: children.into_iter().map(|c| c.transform_result(fn_)).collect(),
                divisible,
            },
        };
        fn_(rebuilt)
    }

    pub fn flatten_result(&self) -> Vec<&TransactionPlanResult<L>> {
        let mut out = Vec::new();
        self.flatten_result_into(&mut out);
        out
    }

    fn flatten_result_into<'a>(&'a self, out: &mut Vec<&'a TransactionPlanResult<L>>) {
        match self {
            Self::SingleResult { .. } => out.push(self),
            Self::ParallelResult(children) | Self::SequentialResult { children, .. } => {
                for child in children {
                    child.flatten_result_into(out);
                }
            }
        }
    }

    pub fn status(&self) -> Option<&ExecutionStatus<L>> {
        match self {
            Self::SingleResult { status, .. } => Some(status),
            _ => None,
        }
    }

    /// `true` if every leaf in this subtree succeeded.
    pub fn summarize(&self) -> bool {
        self.every_result(&|node| {
            !matches!(
                node,
                Self::SingleResult {
                    status: ExecutionStatus::Failed { .. },
                    ..
                }
            ) && !matches!(
                node,
                Self::SingleResult {
                    status: ExecutionStatus::Canceled,
                    ..
                }
            )
        })
    }

    /// The first (pre-order) failed leaf, or an error if none failed.
    pub fn get_first_failed(&self) -> Result<&TransactionPlanResult<L>, PlanError<L>> {
        self.find_result(&|node| {
            matches!(
                node,
                Self::SingleResult {
                    status: ExecutionStatus::Failed { .. },
                    ..
                }
            )
        })
        .ok_or(PlanError::FailedSingleTransactionPlanResultNotFound)
    }

    /// Builds a [`PlanError::FailedToExecuteTransactionPlan`] from `self`,
    /// using the first failed leaf's error as `cause` — or, if no leaf ever
    /// failed (the whole tree was cancelled before any dispatch, spec
    /// §4.5 point 3), `cancellation`'s reason instead.
    pub(crate) fn into_execution_failure(self, cancellation: &Cancellation) -> PlanError<L> {
        let cause = match self.get_first_failed() {
            Ok(Self::SingleResult {
                status: ExecutionStatus::Failed { error, .. },
                ..
            }) => error.clone(),
            _ => cancellation
                .reason()
                .unwrap_or_else(|| "transaction plan execution failed".to_string()),
        };
        PlanError::FailedToExecuteTransactionPlan {
            cause,
            result_tree: Box::new(self),
        }
    }
}

/// `passthrough_failed_execution` (spec §4.6): await `fut`; if it raised
/// [`PlanError::FailedToExecuteTransactionPlan`], unwrap and resolve with
/// its preserved `result_tree` instead of propagating the error. Any other
/// error (or a success) passes through unchanged.
pub async fn passthrough_failed_execution<L, F>(fut: F) -> PlanResult<TransactionPlanResult<L>, L>
where
    L: LedgerOps,
    F: std::future::Future<Output = PlanResult<TransactionPlanResult<L>, L>>,
{
    match fut.await {
        Err(PlanError::FailedToExecuteTransactionPlan { result_tree, .. }) => Ok(*result_tree),
        other => other,
    }
}
