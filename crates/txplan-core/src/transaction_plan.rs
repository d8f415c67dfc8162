//! Transaction-plan algebra: the planner's output tree (spec §3.2, §4.3).
//!
//! Shaped like [`InstructionPlan`](crate::plan::InstructionPlan) but with
//! `Single` holding a finished `L::Message` instead of a bare instruction,
//! and no `MessagePacker` variant — by the time a tree of this shape
//! exists, every packer has already been driven to completion.

use crate::error::PlanError;
use crate::ledger::LedgerOps;
use crate::plan::{parse_instruction_plan_input, InstructionPlan, PlanItem};

pub enum TransactionPlan<L: LedgerOps> {
    /// One complete, ready-to-sign message.
    Single(L::Message),
    /// Independent messages; the executor may dispatch these concurrently.
    Parallel(Vec<TransactionPlan<L>>),
    /// Messages that must execute in order. `divisible` records whether the
    /// planner was allowed to split this subtree across transactions; by
    /// the time this tree is built `divisible: false` nodes are always a
    /// single child (see spec §4.4 non-divisible handling) but the flag is
    /// kept so the executor can reject any future producer that violates it.
    Sequential {
        children: Vec<TransactionPlan<L>>,
        divisible: bool,
    },
}

/// Hand-written so the bound stays `L: LedgerOps` rather than derive's
/// default `L: Clone` (see the matching note on
/// [`PlanError`](crate::error::PlanError)'s `Debug` impl).
impl<L: LedgerOps> Clone for TransactionPlan<L> {
    fn clone(&self) -> Self {
        match self {
            Self::Single(m) => Self::Single(m.clone()),
            Self::Parallel(children) => Self::Parallel(children.clone()),
            Self::Sequential { children, divisible } => Self::Sequential {
                children: children.clone(),
                divisible: *divisible,
            },
        }
    }
}

impl<L: LedgerOps> std::fmt::Debug for TransactionPlan<L>
where
    L::Message: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(m) => f.debug_tuple("Single").field(m).finish(),
            Self::Parallel(children) => f.debug_tuple("Parallel").field(children).finish(),
            Self::Sequential { children, divisible } => f
                .debug_struct("Sequential")
                .field("children", children)
                .field("divisible", divisible)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPlanKind {
    Single,
    Parallel,
    Sequential,
}

impl<L: LedgerOps> TransactionPlan<L> {
    pub fn kind(&self) -> TransactionPlanKind {
        match self {
            Self::Single(_) => TransactionPlanKind::Single,
            Self::Parallel(_) => TransactionPlanKind::Parallel,
            Self::Sequential { .. } => TransactionPlanKind::Sequential,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
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

    fn children(&self) -> &[TransactionPlan<L>] {
        match self {
            Self::Parallel(children) => children,
            Self::Sequential { children, .. } => children,
            Self::Single(_) => &[],
        }
    }

    pub fn find(&self, predicate: &dyn Fn(&TransactionPlan<L>) -> bool) -> Option<&TransactionPlan<L>> {
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

    pub fn every(&self, predicate: &dyn Fn(&TransactionPlan<L>) -> bool) -> bool {
        if !predicate(self) {
            return false;
        }
        self.children().iter().all(|c| c.every(predicate))
    }

    /// Ordered `Single` messages in left-to-right traversal order.
    pub fn flatten(&self) -> Vec<&L::Message> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a L::Message>) {
        match self {
            Self::Single(m) => out.push(m),
            Self::Parallel(children) | Self::Sequential { children, .. } => {
                for child in children {
                    child.flatten_into(out);
                }
            }
        }
    }

    pub fn expect_kind(&self, expected: TransactionPlanKind) -> Result<&TransactionPlan<L>, PlanError<L>> {
        if self.kind() == expected {
            Ok(self)
        } else {
            Err(PlanError::UnexpectedTransactionPlanResult {
                expected: kind_name(expected),
                actual: kind_name(self.kind()),
            })
        }
    }
}

fn kind_name(kind: TransactionPlanKind) -> &'static str {
    match kind {
        TransactionPlanKind::Single => "Single",
        TransactionPlanKind::Parallel => "Parallel",
        TransactionPlanKind::Sequential => "Sequential",
    }
}

// ---------------------------------------------------------------------------
// Input parsing (spec §6)
// ---------------------------------------------------------------------------

/// One element of a loose, possibly-mixed transaction-plan input list: a
/// bare message or an already-built plan.
pub enum TransactionPlanItem<L: LedgerOps> {
    Message(L::Message),
    Plan(TransactionPlan<L>),
}

impl<L: LedgerOps> TransactionPlanItem<L> {
    fn into_plan(self) -> TransactionPlan<L> {
        match self {
            Self::Message(m) => TransactionPlan::Single(m),
            Self::Plan(p) => p,
        }
    }
}

/// Normalize a bare leaf or a (possibly mixed) list into a canonical tree:
/// empty list → empty divisible `Sequential`; single-element list → that
/// element unwrapped; mixed list → divisible `Sequential` of the elements.
/// Same shape-normalization rule as [`parse_instruction_plan_input`], over
/// already-planned messages instead of instructions.
pub fn parse_transaction_plan_input<L: LedgerOps>(items: Vec<TransactionPlanItem<L>>) -> TransactionPlan<L> {
    let mut plans: Vec<TransactionPlan<L>> = items.into_iter().map(TransactionPlanItem::into_plan).collect();
    match plans.len() {
        0 => TransactionPlan::Sequential {
            children: Vec::new(),
            divisible: true,
        },
        1 => plans.pop().expect("length checked above"),
        _ => TransactionPlan::Sequential {
            children: plans,
            divisible: true,
        },
    }
}

/// One element of a loose input list that mixes not-yet-planned instruction
/// input with already-planned transaction input.
pub enum InstructionOrTransactionPlanItem<L: LedgerOps> {
    Instruction(PlanItem<L>),
    Transaction(TransactionPlanItem<L>),
}

/// Normalize a mixed list of instruction-domain and transaction-domain
/// items. `InstructionPlan<L>` and `TransactionPlan<L>` have no common
/// representation (one holds opaque instructions, the other finished
/// messages), so rather than inventing a combined node kind, each domain's
/// items are partitioned out and independently normalized by
/// [`parse_instruction_plan_input`]/[`parse_transaction_plan_input`] — a
/// domain with no items in the input normalizes to its own empty divisible
/// `Sequential`, same as calling either parser with an empty `Vec`.
pub fn parse_instruction_or_transaction_plan_input<L: LedgerOps>(
    items: Vec<InstructionOrTransactionPlanItem<L>>,
) -> (InstructionPlan<L>, TransactionPlan<L>) {
    let mut instruction_items = Vec::new();
    let mut transaction_items = Vec::new();
    for item in items {
        match item {
            InstructionOrTransactionPlanItem::Instruction(i) => instruction_items.push(i),
            InstructionOrTransactionPlanItem::Transaction(t) => transaction_items.push(t),
        }
    }
    (
        parse_instruction_plan_input(instruction_items),
        parse_transaction_plan_input(transaction_items),
    )
}
