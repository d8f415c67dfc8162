//! Instruction-plan algebra: the input tree (spec §3.1, §4.1).

pub mod flat_appender;
pub mod packer;

use std::sync::Arc;

use crate::ledger::LedgerOps;
pub use packer::{Packer, PackerFactory};

/// One node of the instruction-plan tree.
///
/// A finite, immutable tree once constructed — there is no public API to
/// mutate a node in place, only to build a new one (see [`transform`]).
pub enum InstructionPlan<L: LedgerOps> {
    /// One opaque instruction.
    Single(L::Instruction),
    /// Children may execute in separate transactions independently;
    /// relative ordering among them is not constrained.
    Parallel(Vec<InstructionPlan<L>>),
    /// Children must execute in order. `divisible = false` additionally
    /// requires the whole subtree to land within one transaction.
    Sequential {
        children: Vec<InstructionPlan<L>>,
        divisible: bool,
    },
    /// A factory yielding a fresh, stateful instruction producer bound to
    /// a byte budget. Has no intrinsic children — a leaf.
    MessagePacker(Arc<dyn PackerFactory<L>>),
}

impl<L: LedgerOps> Clone for InstructionPlan<L> {
    fn clone(&self) -> Self {
        match self {
            Self::Single(i) => Self::Single(i.clone()),
            Self::Parallel(children) => Self::Parallel(children.clone()),
            Self::Sequential { children, divisible } => Self::Sequential {
                children: children.clone(),
                divisible: *divisible,
            },
            Self::MessagePacker(factory) => Self::MessagePacker(factory.clone()),
        }
    }
}

impl<L: LedgerOps> std::fmt::Debug for InstructionPlan<L>
where
    L::Instruction: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(i) => f.debug_tuple("Single").field(i).finish(),
            Self::Parallel(children) => f.debug_tuple("Parallel").field(children).finish(),
            Self::Sequential { children, divisible } => f
                .debug_struct("Sequential")
                .field("children", children)
                .field("divisible", divisible)
                .finish(),
            Self::MessagePacker(_) => f.write_str("MessagePacker(..)"),
        }
    }
}

/// The kind tag used by predicates, assertions, and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionPlanKind {
    Single,
    Parallel,
    Sequential,
    MessagePacker,
}

impl<L: LedgerOps> InstructionPlan<L> {
    pub fn kind(&self) -> InstructionPlanKind {
        match self {
            Self::Single(_) => InstructionPlanKind::Single,
            Self::Parallel(_) => InstructionPlanKind::Parallel,
            Self::Sequential { .. } => InstructionPlanKind::Sequential,
            Self::MessagePacker(_) => InstructionPlanKind::MessagePacker,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel(_))
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::Sequential { .. })
    }

    pub fn is_non_divisible_sequential(&self) -> bool {
        matches!(
            self,
            Self::Sequential {
                divisible: false,
                ..
            }
        )
    }

    pub fn is_message_packer(&self) -> bool {
        matches!(self, Self::MessagePacker(_))
    }

    fn children(&self) -> &[InstructionPlan<L>] {
        match self {
            Self::Parallel(children) => children,
            Self::Sequential { children, .. } => children,
            Self::Single(_) | Self::MessagePacker(_) => &[],
        }
    }

    /// Depth-first, pre-order search: the root is tested before any child.
    pub fn find(&self, predicate: &dyn Fn(&InstructionPlan<L>) -> bool) -> Option<&InstructionPlan<L>> {
        if predicate(self) {
            return Some(self);
        }
        for child in self.children() {
            if let Some(found) = child.find(predicate) {
                return Some(found);
            }
        }
        None
    }

    /// Depth-first; short-circuits on the first node (root-first,
    /// ancestor-before-descendant, earlier-sibling-before-later) for
    /// which `predicate` returns `false`.
    pub fn every(&self, predicate: &dyn Fn(&InstructionPlan<L>) -> bool) -> bool {
        if !predicate(self) {
            return false;
        }
        for child in self.children() {
            if !child.every(predicate) {
                return false;
            }
        }
        true
    }

    /// Bottom-up rewrite: children are transformed first, the node is
    /// rebuilt with the transformed children, and only then is `fn_`
    /// applied to the rebuilt node.
    pub fn transform(
        self,
        fn_: &dyn Fn(InstructionPlan<L>) -> InstructionPlan<L>,
    ) -> InstructionPlan<L> {
        let rebuilt = match self {
            Self::Single(_) | Self::MessagePacker(_) => self,
            Self::Parallel(children) => {
                Self::Parallel(children.into_iter().map(|c| c.transform(fn_)).collect())
            }
            Self::Sequential { children, divisible } => Self::Sequential {
                children: children.into_iter().map(|c| c.transform(fn_)).collect(),
                divisible,
            },
        };
        fn_(rebuilt)
    }

    /// Ordered leaves (`Single` and `MessagePacker`) in left-to-right
    /// traversal order.
    pub fn flatten(&self) -> Vec<&InstructionPlan<L>> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a InstructionPlan<L>>) {
        match self {
            Self::Single(_) | Self::MessagePacker(_) => out.push(self),
            Self::Parallel(children) | Self::Sequential { children, .. } => {
                for child in children {
                    child.flatten_into(out);
                }
            }
        }
    }

    pub fn expect_kind(
        &self,
        expected: InstructionPlanKind,
    ) -> Result<&InstructionPlan<L>, crate::error::PlanError<L>> {
        if self.kind() == expected {
            Ok(self)
        } else {
            Err(crate::error::PlanError::UnexpectedInstructionPlan {
                expected: kind_name(expected),
                actual: kind_name(self.kind()),
            })
        }
    }
}

fn kind_name(kind: InstructionPlanKind) -> &'static str {
    match kind {
        InstructionPlanKind::Single => "Single",
        InstructionPlanKind::Parallel => "Parallel",
        InstructionPlanKind::Sequential => "Sequential",
        InstructionPlanKind::MessagePacker => "MessagePacker",
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

pub fn single<L: LedgerOps>(instruction: L::Instruction) -> InstructionPlan<L> {
    InstructionPlan::Single(instruction)
}

pub fn parallel<L: LedgerOps>(children: Vec<InstructionPlan<L>>) -> InstructionPlan<L> {
    InstructionPlan::Parallel(children)
}

pub fn sequential<L: LedgerOps>(children: Vec<InstructionPlan<L>>) -> InstructionPlan<L> {
    InstructionPlan::Sequential {
        children,
        divisible: true,
    }
}

pub fn non_divisible_sequential<L: LedgerOps>(children: Vec<InstructionPlan<L>>) -> InstructionPlan<L> {
    InstructionPlan::Sequential {
        children,
        divisible: false,
    }
}

pub fn message_packer<L: LedgerOps>(factory: Arc<dyn PackerFactory<L>>) -> InstructionPlan<L> {
    InstructionPlan::MessagePacker(factory)
}

// ---------------------------------------------------------------------------
// Input parsing (spec §6)
// ---------------------------------------------------------------------------

/// One element of a loose, possibly-mixed input list: a bare instruction
/// or an already-built plan.
pub enum PlanItem<L: LedgerOps> {
    Instruction(L::Instruction),
    Plan(InstructionPlan<L>),
}

impl<L: LedgerOps> PlanItem<L> {
    fn into_plan(self) -> InstructionPlan<L> {
        match self {
            Self::Instruction(i) => InstructionPlan::Single(i),
            Self::Plan(p) => p,
        }
    }
}

/// Normalize a bare leaf or a (possibly mixed) list into a canonical tree:
/// empty list → empty divisible `Sequential`; single-element list → that
/// element unwrapped; mixed list → divisible `Sequential` of the elements.
pub fn parse_instruction_plan_input<L: LedgerOps>(items: Vec<PlanItem<L>>) -> InstructionPlan<L> {
    let mut plans: Vec<InstructionPlan<L>> = items.into_iter().map(PlanItem::into_plan).collect();
    match plans.len() {
        0 => sequential(Vec::new()),
        1 => plans.pop().expect("length checked above"),
        _ => sequential(plans),
    }
}
