//! Crate-level error taxonomy for `txplan-core`.
//!
//! Mirrors the tagged-error set spec'd for the core: every error the
//! planner or executor can raise is a variant of [`PlanError`].

use thiserror::Error;

use crate::ledger::LedgerOps;
use crate::result::TransactionPlanResult;

/// Crate-level error type, generic over the ledger `L` so that
/// `result_tree` can hold a real [`TransactionPlanResult<L>`] and `Hook`
/// can carry `L::HookError`.
///
/// `Debug` is implemented by hand (below) rather than derived: a derived
/// impl would add a blanket `L: Debug` bound, but what the `result_tree`
/// field actually needs is `L::Message: Debug` and `L::Signature: Debug`.
#[derive(Error)]
#[non_exhaustive]
pub enum PlanError<L: LedgerOps> {
    /// The planner produced no nodes at all.
    #[error("instruction plan reduced to nothing")]
    EmptyInstructionPlan,

    /// A leaf cannot fit within the transaction size limit even alone.
    #[error(
        "message cannot accommodate plan: needs {bytes_required} more bytes, {bytes_free} free"
    )]
    MessageCannotAccommodatePlan { bytes_required: u32, bytes_free: i64 },

    /// `pack_to_capacity` was called after `done()` became true.
    #[error("message packer already completed")]
    MessagePackerAlreadyComplete,

    /// The executor was given a plan containing a non-divisible sequential
    /// subtree; the shipped executor does not bundle, so this must be
    /// resolved upstream (typically by re-running the planner).
    #[error("non-divisible transaction plans are not supported by this executor")]
    NonDivisibleTransactionPlansNotSupported,

    /// Execution failed; the partially-completed result tree is preserved
    /// on the error for inspection via [`PlanError::result_tree`] but is
    /// deliberately excluded from `Display`/`Debug` output.
    #[error("failed to execute transaction plan: {cause}")]
    FailedToExecuteTransactionPlan {
        cause: String,
        result_tree: Box<TransactionPlanResult<L>>,
    },

    /// A helper expected to find a failed leaf and didn't.
    #[error("no failed transaction plan result was found")]
    FailedSingleTransactionPlanResultNotFound,

    /// An assertion on an instruction-plan node's kind failed.
    #[error("unexpected instruction plan: expected {expected}, got {actual}")]
    UnexpectedInstructionPlan {
        expected: &'static str,
        actual: &'static str,
    },

    /// An assertion on a transaction-plan-result node's kind failed.
    #[error("unexpected transaction plan result: expected {expected}, got {actual}")]
    UnexpectedTransactionPlanResult {
        expected: &'static str,
        actual: &'static str,
    },

    /// Defensive: an instruction-plan node carried an unrecognized kind.
    #[error("invalid instruction plan kind: {0}")]
    InvalidInstructionPlanKind(&'static str),

    /// Defensive: a transaction-plan node carried an unrecognized kind.
    #[error("invalid transaction plan kind: {0}")]
    InvalidTransactionPlanKind(&'static str),

    /// A cancellation token was tripped; carries its reason.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An error raised by a caller-supplied hook.
    #[error(transparent)]
    Hook(L::HookError),
}

impl<L: LedgerOps> PlanError<L> {
    /// Access the preserved result tree of a
    /// [`PlanError::FailedToExecuteTransactionPlan`], if this is that variant.
    ///
    /// Kept as an explicit accessor rather than a `Display`/`Debug` field so
    /// that default string/log representations of the error stay short —
    /// the Rust analogue of a non-enumerable error field.
    pub fn result_tree(&self) -> Option<&TransactionPlanResult<L>> {
        match self {
            Self::FailedToExecuteTransactionPlan { result_tree, .. } => Some(result_tree),
            _ => None,
        }
    }
}

/// Hand-written rather than derived so the only bound is `L: LedgerOps`:
/// a derived impl would require `L: Debug`, but what's actually needed is
/// `L::Message`/`L::Signature: Debug`, which `result_tree` deliberately
/// never exposes here (see [`PlanError::result_tree`]).
impl<L: LedgerOps> std::fmt::Debug for PlanError<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyInstructionPlan => f.write_str("EmptyInstructionPlan"),
            Self::MessageCannotAccommodatePlan {
                bytes_required,
                bytes_free,
            } => f
                .debug_struct("MessageCannotAccommodatePlan")
                .field("bytes_required", bytes_required)
                .field("bytes_free", bytes_free)
                .finish(),
            Self::MessagePackerAlreadyComplete => f.write_str("MessagePackerAlreadyComplete"),
            Self::NonDivisibleTransactionPlansNotSupported => {
                f.write_str("NonDivisibleTransactionPlansNotSupported")
            }
            Self::FailedToExecuteTransactionPlan { cause, .. } => f
                .debug_struct("FailedToExecuteTransactionPlan")
                .field("cause", cause)
                .field("result_tree", &"<omitted>")
                .finish(),
            Self::FailedSingleTransactionPlanResultNotFound => {
                f.write_str("FailedSingleTransactionPlanResultNotFound")
            }
            Self::UnexpectedInstructionPlan { expected, actual } => f
                .debug_struct("UnexpectedInstructionPlan")
                .field("expected", expected)
                .field("actual", actual)
                .finish(),
            Self::UnexpectedTransactionPlanResult { expected, actual } => f
                .debug_struct("UnexpectedTransactionPlanResult")
                .field("expected", expected)
                .field("actual", actual)
                .finish(),
            Self::InvalidInstructionPlanKind(kind) => {
                f.debug_tuple("InvalidInstructionPlanKind").field(kind).finish()
            }
            Self::InvalidTransactionPlanKind(kind) => {
                f.debug_tuple("InvalidTransactionPlanKind").field(kind).finish()
            }
            Self::Cancelled(reason) => f.debug_tuple("Cancelled").field(reason).finish(),
            Self::Hook(err) => f.debug_tuple("Hook").field(err).finish(),
        }
    }
}

/// Internal error raised by [`Packer::pack_to_capacity`](crate::plan::Packer::pack_to_capacity).
///
/// Always converted into a [`PlanError`] at the planner boundary; kept
/// separate because packers have no knowledge of the ledger's hook error
/// type.
#[derive(Debug, Error, Clone, Copy)]
pub enum PackError {
    #[error(
        "message cannot accommodate plan: needs {bytes_required} more bytes, {bytes_free} free"
    )]
    CannotAccommodate { bytes_required: u32, bytes_free: i64 },
    #[error("message packer already completed")]
    AlreadyComplete,
}

impl<L: LedgerOps> From<PackError> for PlanError<L> {
    fn from(err: PackError) -> Self {
        match err {
            PackError::CannotAccommodate {
                bytes_required,
                bytes_free,
            } => Self::MessageCannotAccommodatePlan {
                bytes_required,
                bytes_free,
            },
            PackError::AlreadyComplete => Self::MessagePackerAlreadyComplete,
        }
    }
}

pub type PlanResult<T, L> = Result<T, PlanError<L>>;
