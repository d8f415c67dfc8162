//! Compiles a tree of instructions into byte-budgeted transaction messages
//! and executes the resulting plan against caller-supplied hooks.
//!
//! Three pieces, matching the crate's module layout:
//!
//! - [`plan`]: the input algebra ([`plan::InstructionPlan`]) a caller
//!   builds up out of `Single`/`Parallel`/`Sequential`/`MessagePacker` nodes.
//! - [`planner`]: [`planner::Planner`] compiles an [`plan::InstructionPlan`]
//!   into a [`transaction_plan::TransactionPlan`] that respects
//!   [`config::PlannerLimits::tx_size_limit`].
//! - [`executor`]: [`executor::Executor`] walks a
//!   [`transaction_plan::TransactionPlan`] and dispatches each message
//!   through [`hooks::ExecuteHooks`], producing a
//!   [`result::TransactionPlanResult`].

pub mod cancellation;
pub mod config;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod ledger;
pub mod plan;
pub mod planner;
pub mod result;
#[cfg(test)]
mod test_support;
pub mod transaction_plan;

pub use cancellation::Cancellation;
pub use config::PlannerLimits;
pub use error::{PackError, PlanError, PlanResult};
pub use executor::Executor;
pub use hooks::{ExecuteHooks, ExecuteOutcome, ExecutionContext, PlannerHooks};
pub use ledger::LedgerOps;
pub use plan::{
    message_packer, non_divisible_sequential, parallel, parse_instruction_plan_input, sequential,
    single, InstructionPlan, InstructionPlanKind, PlanItem,
};
pub use planner::Planner;
pub use result::{passthrough_failed_execution, ExecutionStatus, TransactionPlanResult};
pub use transaction_plan::{
    parse_instruction_or_transaction_plan_input, parse_transaction_plan_input,
    InstructionOrTransactionPlanItem, TransactionPlan, TransactionPlanItem, TransactionPlanKind,
};
