//! The single trait every other module in this crate is generic over.
//!
//! The core never inspects instructions or messages — it only needs to
//! measure and append them. Bundling the associated types and the two
//! pure operations into one trait (rather than threading `Message`,
//! `Instruction`, `Signature` as three separate generic parameters
//! everywhere) keeps every public signature in the crate to a single
//! type parameter.

use std::fmt::Debug;

/// The caller-supplied ledger operations the core is built against.
///
/// A concrete implementation owns the wire format: what an instruction
/// and a message look like, how to measure a message's serialized size,
/// and how to append instructions to one. None of that is opaque to the
/// core beyond these two pure functions.
pub trait LedgerOps: Send + Sync + 'static {
    /// An opaque unit of work. The core never looks inside it.
    type Instruction: Clone + Send + Sync + 'static;

    /// A serializable bundle of instructions plus fee payer and version.
    type Message: Clone + Send + Sync + 'static;

    /// Whatever a successful dispatch returns as proof of submission.
    type Signature: Clone + Debug + Send + Sync + 'static;

    /// Error type raised by caller-supplied hooks
    /// ([`PlannerHooks`](crate::hooks::PlannerHooks),
    /// [`ExecuteHooks`](crate::hooks::ExecuteHooks)).
    type HookError: std::error::Error + Send + Sync + 'static;

    /// Byte length of `message` once serialized.
    fn measure(&self, message: &Self::Message) -> u32;

    /// Returns a new message with `instructions` appended. Pure — does
    /// not mutate `message`.
    fn append(&self, instructions: &[Self::Instruction], message: &Self::Message) -> Self::Message;
}
