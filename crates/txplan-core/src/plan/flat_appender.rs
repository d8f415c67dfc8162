//! Finalizes a flattened list of instruction-plan leaves into a concrete
//! message, erroring if the budget is exceeded partway through.
//!
//! Used by the planner to place a non-divisible subtree (or any other
//! already-decided leaf run) onto a message with no further splitting
//! allowed: overflow here is a hard [`PlanError::MessageCannotAccommodatePlan`],
//! not a cue to start a fresh message.

use crate::config::PlannerLimits;
use crate::error::PlanError;
use crate::ledger::LedgerOps;
use crate::plan::InstructionPlan;

fn within_budget<L: LedgerOps>(ops: &L, limits: &PlannerLimits, message: &L::Message) -> bool {
    // -1 reserves one byte for shortU16 growth in the transaction header.
    (ops.measure(message) as i64) <= limits.tx_size_limit as i64 - 1
}

/// Append every leaf in `leaves`, in order, onto `message`, with no
/// intermediate message splitting.
///
/// `Single` leaves are appended directly. `MessagePacker` leaves are driven
/// to completion by repeatedly calling `pack_to_capacity` until `done()`.
/// Any other node reaching this point is a defensive `InvalidInstructionPlanKind`.
pub fn append_flat<L: LedgerOps>(
    leaves: &[&InstructionPlan<L>],
    ops: &L,
    limits: &PlannerLimits,
    mut message: L::Message,
) -> Result<L::Message, PlanError<L>> {
    for leaf in leaves {
        message = match leaf {
            InstructionPlan::Single(instruction) => {
                let candidate = ops.append(std::slice::from_ref(instruction), &message);
                if !within_budget(ops, limits, &candidate) {
                    return Err(PlanError::MessageCannotAccommodatePlan {
                        bytes_required: ops.measure(&candidate).saturating_sub(limits.tx_size_limit),
                        bytes_free: limits.tx_size_limit as i64 - ops.measure(&message) as i64 - 1,
                    });
                }
                candidate
            }
            InstructionPlan::MessagePacker(factory) => {
                let mut packer = factory.get_packer();
                let mut current = message;
                while !packer.done() {
                    current = packer.pack_to_capacity(&current, ops, limits)?;
                }
                current
            }
            InstructionPlan::Parallel(_) | InstructionPlan::Sequential { .. } => {
                return Err(PlanError::InvalidInstructionPlanKind(
                    "flatten() yielded a non-leaf node",
                ));
            }
        };
    }
    Ok(message)
}
