//! Caller-supplied hooks: the external interfaces the planner and
//! executor consume (spec §6), modeled as async traits in the style of
//! `mofa_kernel::workflow::graph::NodeFunc`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::cancellation::Cancellation;
use crate::ledger::LedgerOps;

/// Hooks consumed by the planner.
#[async_trait]
pub trait PlannerHooks<L: LedgerOps>: Send + Sync {
    /// Produce a fresh message with fee-payer/version set.
    async fn create_message(&self, cancellation: &Cancellation) -> Result<L::Message, L::HookError>;

    /// Called after every append; returns a possibly-transformed message
    /// (e.g. to recompute a compute-budget instruction). Default: identity.
    async fn on_message_updated(
        &self,
        message: L::Message,
        _cancellation: &Cancellation,
    ) -> Result<L::Message, L::HookError> {
        Ok(message)
    }
}

/// What a dispatch returned: a bare signature, or a signature plus the
/// signed transaction the caller chose to also hand back.
#[derive(Debug, Clone)]
pub enum ExecuteOutcome<L: LedgerOps> {
    Signature(L::Signature),
    SignedTransaction {
        signature: L::Signature,
        transaction: L::Message,
    },
}

impl<L: LedgerOps> ExecuteOutcome<L> {
    pub fn signature(&self) -> &L::Signature {
        match self {
            Self::Signature(sig) => sig,
            Self::SignedTransaction { signature, .. } => signature,
        }
    }

    pub fn transaction(&self) -> Option<&L::Message> {
        match self {
            Self::Signature(_) => None,
            Self::SignedTransaction { transaction, .. } => Some(transaction),
        }
    }
}

/// Free-form map a dispatch may populate before returning, per spec §3.3.
/// Keys `signature`/`transaction` are reserved: the executor strips them
/// out of the surfaced context since the typed fields on
/// [`ExecutionStatus`](crate::result::ExecutionStatus) take precedence.
pub type ExecutionContext = Map<String, Value>;

pub(crate) fn strip_reserved_keys(mut context: ExecutionContext) -> ExecutionContext {
    context.remove("signature");
    context.remove("transaction");
    context
}

/// Hooks consumed by the executor: the caller-supplied dispatch routine.
#[async_trait]
pub trait ExecuteHooks<L: LedgerOps>: Send + Sync {
    async fn execute_message(
        &self,
        context: &mut ExecutionContext,
        message: &L::Message,
        cancellation: &Cancellation,
    ) -> Result<ExecuteOutcome<L>, L::HookError>;

    /// Best-effort signature derivation for a `Failed` result whose
    /// `context` already carries a `transaction` entry the callback wrote
    /// before erroring (spec §4.5 point 2). Default: no derivation.
    fn derive_signature_from_context(&self, _context: &ExecutionContext) -> Option<L::Signature> {
        None
    }
}
