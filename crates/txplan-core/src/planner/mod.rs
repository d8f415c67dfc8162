//! Compiles an [`InstructionPlan`] into a byte-budgeted [`TransactionPlan`]
//! (spec §4.4).
//!
//! The planner threads a pool of **candidates** — messages still under
//! construction — through its recursion. A candidate never "closes": once
//! created it stays eligible for later placement, which is what lets a
//! `MessagePacker` processed near the end of a `Parallel` node backfill
//! whatever room an earlier sibling's message left behind, rather than
//! always starting a fresh message of its own.
//!
//! `Parallel` does not mean "separate transactions": it only drops the
//! ordering constraint between children. Its children share one candidate
//! pool and are iterated in source order with one reordering rule: any
//! `MessagePacker` child is processed last, so it soaks up leftover bytes
//! instead of claiming capacity a fixed-size sibling needed.
//!
//! `Sequential` threads a single candidate through its children instead of
//! a pool, since later children must land after earlier ones. A
//! non-divisible `Sequential` (or any node directly under a `Parallel`)
//! first attempts to fit atomically into one existing candidate via the
//! flat appender; only on failure does it fall back to building fresh.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::cancellation::Cancellation;
use crate::config::PlannerLimits;
use crate::error::{PlanError, PlanResult};
use crate::hooks::PlannerHooks;
use crate::ledger::LedgerOps;
use crate::plan::{flat_appender, InstructionPlan, PackerFactory};
use crate::transaction_plan::TransactionPlan;

/// Compiles instruction plans for a single [`LedgerOps`] implementation.
pub struct Planner<L: LedgerOps> {
    ops: L,
    limits: PlannerLimits,
}

impl<L: LedgerOps> Planner<L> {
    pub fn new(ops: L) -> Self {
        Self::with_limits(ops, PlannerLimits::default())
    }

    pub fn with_limits(ops: L, limits: PlannerLimits) -> Self {
        Self { ops, limits }
    }

    pub fn limits(&self) -> &PlannerLimits {
        &self.limits
    }

    #[instrument(skip_all)]
    pub async fn plan<H: PlannerHooks<L>>(
        &self,
        instruction_plan: InstructionPlan<L>,
        hooks: &H,
        cancellation: &Cancellation,
    ) -> PlanResult<TransactionPlan<L>, L> {
        cancellation.check().map_err(PlanError::Cancelled)?;

        let ctx = Ctx {
            ops: &self.ops,
            limits: &self.limits,
            hooks,
            cancellation,
        };
        let mut candidates: Vec<Candidate<L>> = Vec::new();
        let working = plan_node(&ctx, &instruction_plan, &mut candidates, ParentKind::None).await?;
        let working = working.ok_or(PlanError::EmptyInstructionPlan)?;
        let leaf_count = count_singles(&working);
        drop(candidates);

        debug!(leaf_count, "planning complete");
        Ok(freeze(working))
    }
}

type Candidate<L> = Rc<RefCell<<L as LedgerOps>::Message>>;

struct Ctx<'h, L: LedgerOps, H: PlannerHooks<L>> {
    ops: &'h L,
    limits: &'h PlannerLimits,
    hooks: &'h H,
    cancellation: &'h Cancellation,
}

/// The node directly above the one currently being planned; governs
/// whether the atomic-fit attempt (Case A) applies and how a bare
/// `MessagePacker`'s multiple emitted messages get wrapped.
#[derive(Clone, Copy)]
enum ParentKind {
    None,
    Parallel,
    Sequential { divisible: bool },
}

/// Mutable working tree built during recursion. Shaped like
/// [`TransactionPlan`] but `Single` holds a shared, still-mutable
/// candidate rather than a finished message — mutating a candidate after
/// it has already been emitted is how later siblings extend an
/// already-represented node in place.
enum Working<L: LedgerOps> {
    Single(Candidate<L>),
    Sequential { children: Vec<Working<L>>, divisible: bool },
    Parallel(Vec<Working<L>>),
}

fn collect_singles<L: LedgerOps>(node: &Working<L>, out: &mut Vec<Candidate<L>>) {
    match node {
        Working::Single(c) => out.push(c.clone()),
        Working::Sequential { children, .. } | Working::Parallel(children) => {
            for child in children {
                collect_singles(child, out);
            }
        }
    }
}

fn last_single<L: LedgerOps>(node: &Working<L>) -> Candidate<L> {
    let mut out = Vec::new();
    collect_singles(node, &mut out);
    out.into_iter().last().expect("a working node always has at least one leaf")
}

fn count_singles<L: LedgerOps>(node: &Working<L>) -> usize {
    let mut out = Vec::new();
    collect_singles(node, &mut out);
    out.len()
}

/// Rebuilds the mutable working tree through the immutable
/// [`TransactionPlan`] constructors, per spec §4.4's "output freezing".
fn freeze<L: LedgerOps>(node: Working<L>) -> TransactionPlan<L> {
    match node {
        Working::Single(c) => {
            TransactionPlan::Single(Rc::try_unwrap(c).map(RefCell::into_inner).unwrap_or_else(|rc| rc.borrow().clone()))
        }
        Working::Sequential { children, divisible } => TransactionPlan::Sequential {
            children: children.into_iter().map(freeze).collect(),
            divisible,
        },
        Working::Parallel(children) => TransactionPlan::Parallel(children.into_iter().map(freeze).collect()),
    }
}

fn within_budget<L: LedgerOps>(ops: &L, limits: &PlannerLimits, message: &L::Message) -> bool {
    // -1 reserves one byte for shortU16 growth in the transaction header.
    (ops.measure(message) as i64) <= limits.tx_size_limit as i64 - 1
}

fn accommodate_error<L: LedgerOps>(
    ops: &L,
    limits: &PlannerLimits,
    candidate: &L::Message,
    base: &L::Message,
) -> PlanError<L> {
    PlanError::MessageCannotAccommodatePlan {
        bytes_required: ops.measure(candidate).saturating_sub(limits.tx_size_limit),
        bytes_free: limits.tx_size_limit as i64 - ops.measure(base) as i64 - 1,
    }
}

/// `try_place` (spec §4.4): try `predicate` against each candidate in
/// order, committing the first whose post-hook size fits.
async fn try_place<L, H>(
    ctx: &Ctx<'_, L, H>,
    candidates: &[Candidate<L>],
    mut predicate: impl FnMut(&L::Message) -> PlanResult<L::Message, L>,
) -> PlanResult<Option<Candidate<L>>, L>
where
    L: LedgerOps,
    H: PlannerHooks<L>,
{
    for candidate in candidates {
        ctx.cancellation.check().map_err(PlanError::Cancelled)?;
        let current = candidate.borrow().clone();
        let applied = match predicate(&current) {
            Ok(applied) => applied,
            Err(PlanError::MessageCannotAccommodatePlan { .. }) => continue,
            Err(other) => return Err(other),
        };
        let updated = ctx
            .cancellation
            .race(ctx.hooks.on_message_updated(applied, ctx.cancellation))
            .await
            .map_err(PlanError::Cancelled)?
            .map_err(PlanError::Hook)?;
        if within_budget(ctx.ops, ctx.limits, &updated) {
            *candidate.borrow_mut() = updated;
            trace!("placed onto an existing candidate");
            return Ok(Some(candidate.clone()));
        }
    }
    Ok(None)
}

/// `create_and_fill` (spec §4.4): build a fresh message and commit
/// `predicate` onto it, erroring if even a brand-new message can't hold it.
async fn create_and_fill<L, H>(
    ctx: &Ctx<'_, L, H>,
    mut predicate: impl FnMut(&L::Message) -> PlanResult<L::Message, L>,
) -> PlanResult<Candidate<L>, L>
where
    L: LedgerOps,
    H: PlannerHooks<L>,
{
    ctx.cancellation.check().map_err(PlanError::Cancelled)?;
    let fresh = ctx
        .cancellation
        .race(ctx.hooks.create_message(ctx.cancellation))
        .await
        .map_err(PlanError::Cancelled)?
        .map_err(PlanError::Hook)?;
    let applied = predicate(&fresh)?;
    let updated = ctx
        .cancellation
        .race(ctx.hooks.on_message_updated(applied, ctx.cancellation))
        .await
        .map_err(PlanError::Cancelled)?
        .map_err(PlanError::Hook)?;
    if !within_budget(ctx.ops, ctx.limits, &updated) {
        return Err(accommodate_error(ctx.ops, ctx.limits, &updated, &fresh));
    }
    trace!("opened a new candidate");
    Ok(Rc::new(RefCell::new(updated)))
}

type BoxPlanFuture<'a, L> = Pin<Box<dyn Future<Output = PlanResult<Option<Working<L>>, L>> + 'a>>;

fn plan_node<'a, L, H>(
    ctx: &'a Ctx<'a, L, H>,
    node: &'a InstructionPlan<L>,
    candidates: &'a mut Vec<Candidate<L>>,
    parent: ParentKind,
) -> BoxPlanFuture<'a, L>
where
    L: LedgerOps,
    H: PlannerHooks<L>,
{
    Box::pin(async move {
        ctx.cancellation.check().map_err(PlanError::Cancelled)?;
        match node {
            InstructionPlan::Single(instruction) => plan_single(ctx, instruction, candidates).await,
            InstructionPlan::MessagePacker(factory) => plan_packer(ctx, factory, candidates, parent).await,
            InstructionPlan::Sequential { children, divisible } => {
                plan_sequential(ctx, children, *divisible, candidates, parent).await
            }
            InstructionPlan::Parallel(children) => plan_parallel(ctx, children, candidates).await,
        }
    })
}

async fn plan_single<L, H>(
    ctx: &Ctx<'_, L, H>,
    instruction: &L::Instruction,
    candidates: &mut Vec<Candidate<L>>,
) -> PlanResult<Option<Working<L>>, L>
where
    L: LedgerOps,
    H: PlannerHooks<L>,
{
    let predicate = |msg: &L::Message| Ok(ctx.ops.append(std::slice::from_ref(instruction), msg));
    if try_place(ctx, candidates, predicate).await?.is_some() {
        return Ok(None);
    }
    let fresh = create_and_fill(ctx, predicate).await?;
    candidates.push(fresh.clone());
    Ok(Some(Working::Single(fresh)))
}

async fn plan_packer<L, H>(
    ctx: &Ctx<'_, L, H>,
    factory: &Arc<dyn PackerFactory<L>>,
    candidates: &mut Vec<Candidate<L>>,
    parent: ParentKind,
) -> PlanResult<Option<Working<L>>, L>
where
    L: LedgerOps,
    H: PlannerHooks<L>,
{
    let mut packer = factory.get_packer();
    let mut created: Vec<Candidate<L>> = Vec::new();

    while !packer.done() {
        ctx.cancellation.check().map_err(PlanError::Cancelled)?;
        let pool = candidates.clone();
        let placed = try_place(ctx, &pool, |msg: &L::Message| {
            packer.pack_to_capacity(msg, ctx.ops, ctx.limits).map_err(PlanError::from)
        })
        .await?;
        if placed.is_none() {
            let fresh = create_and_fill(ctx, |msg: &L::Message| {
                packer.pack_to_capacity(msg, ctx.ops, ctx.limits).map_err(PlanError::from)
            })
            .await?;
            candidates.push(fresh.clone());
            created.push(fresh);
        }
    }

    Ok(match created.len() {
        0 => None,
        1 => Some(Working::Single(created.into_iter().next().expect("length checked above"))),
        _ => {
            let singles: Vec<Working<L>> = created.into_iter().map(Working::Single).collect();
            Some(match parent {
                ParentKind::Parallel => Working::Parallel(singles),
                ParentKind::Sequential { divisible } => Working::Sequential { children: singles, divisible },
                ParentKind::None => Working::Sequential { children: singles, divisible: true },
            })
        }
    })
}

async fn plan_sequential<L, H>(
    ctx: &Ctx<'_, L, H>,
    children: &[InstructionPlan<L>],
    divisible: bool,
    candidates: &mut Vec<Candidate<L>>,
    parent: ParentKind,
) -> PlanResult<Option<Working<L>>, L>
where
    L: LedgerOps,
    H: PlannerHooks<L>,
{
    if children.is_empty() {
        return Ok(None);
    }

    // Case A applies whenever the parent is Parallel (every sibling's
    // candidates are up for grabs) or this node is non-divisible (it must
    // land atomically regardless of parent).
    let case_a_applies = matches!(parent, ParentKind::Parallel) || !divisible;

    if case_a_applies {
        let leaves: Vec<&InstructionPlan<L>> = children.iter().flat_map(|c| c.flatten()).collect();

        for candidate in candidates.iter() {
            ctx.cancellation.check().map_err(PlanError::Cancelled)?;
            let trial = candidate.borrow().clone();
            match flat_appender::append_flat(&leaves, ctx.ops, ctx.limits, trial) {
                Ok(updated) => {
                    *candidate.borrow_mut() = updated;
                    return Ok(None);
                }
                Err(PlanError::MessageCannotAccommodatePlan { .. }) => continue,
                Err(other) => return Err(other),
            }
        }

        if !divisible {
            // No existing candidate fit; a non-divisible subtree has no
            // recourse but a single fresh message built atomically.
            let fresh =
                create_and_fill(ctx, |msg: &L::Message| flat_appender::append_flat(&leaves, ctx.ops, ctx.limits, msg.clone()))
                    .await?;
            candidates.push(fresh.clone());
            return Ok(Some(Working::Single(fresh)));
        }

        // Divisible, but didn't fit atomically anywhere: fall through to
        // normal sequential processing with no inherited candidate.
        return plan_sequential_case_b(ctx, children, divisible, &[], candidates).await;
    }

    let starting: Vec<Candidate<L>> = candidates.first().cloned().into_iter().collect();
    plan_sequential_case_b(ctx, children, divisible, &starting, candidates).await
}

/// Case B: thread a single candidate through children in order, resetting
/// it to the last `Single` leaf emitted by each child so later siblings can
/// extend the same message.
async fn plan_sequential_case_b<L, H>(
    ctx: &Ctx<'_, L, H>,
    children: &[InstructionPlan<L>],
    divisible: bool,
    starting: &[Candidate<L>],
    outer_candidates: &mut Vec<Candidate<L>>,
) -> PlanResult<Option<Working<L>>, L>
where
    L: LedgerOps,
    H: PlannerHooks<L>,
{
    let mut current: Option<Candidate<L>> = starting.first().cloned();
    let mut emitted: Vec<Working<L>> = Vec::new();

    for child in children {
        ctx.cancellation.check().map_err(PlanError::Cancelled)?;
        let mut local_pool: Vec<Candidate<L>> = current.iter().cloned().collect();
        let emission = plan_node(ctx, child, &mut local_pool, ParentKind::Sequential { divisible }).await?;

        for candidate in &local_pool {
            if !outer_candidates.iter().any(|existing| Rc::ptr_eq(existing, candidate)) {
                outer_candidates.push(candidate.clone());
            }
        }

        if let Some(node) = emission {
            current = Some(last_single(&node));
            match node {
                Working::Sequential { children: sub, divisible: child_divisible } if child_divisible == divisible => {
                    emitted.extend(sub);
                }
                other => emitted.push(other),
            }
        }
    }

    Ok(match emitted.len() {
        0 => None,
        1 => Some(emitted.into_iter().next().expect("length checked above")),
        _ => Some(Working::Sequential { children: emitted, divisible }),
    })
}

async fn plan_parallel<L, H>(
    ctx: &Ctx<'_, L, H>,
    children: &[InstructionPlan<L>],
    candidates: &mut Vec<Candidate<L>>,
) -> PlanResult<Option<Working<L>>, L>
where
    L: LedgerOps,
    H: PlannerHooks<L>,
{
    if children.is_empty() {
        return Ok(None);
    }

    // MessagePacker children are processed last so they soak up leftover
    // bytes rather than claiming capacity a fixed-size sibling needed.
    let ordered: Vec<&InstructionPlan<L>> = children
        .iter()
        .filter(|c| !c.is_message_packer())
        .chain(children.iter().filter(|c| c.is_message_packer()))
        .collect();

    let mut emitted = Vec::new();
    for child in ordered {
        ctx.cancellation.check().map_err(PlanError::Cancelled)?;
        let emission = plan_node(ctx, child, candidates, ParentKind::Parallel).await?;
        if let Some(node) = &emission {
            let mut singles = Vec::new();
            collect_singles(node, &mut singles);
            for candidate in singles {
                if !candidates.iter().any(|existing| Rc::ptr_eq(existing, &candidate)) {
                    candidates.push(candidate);
                }
            }
        }
        if let Some(node) = emission {
            emitted.push(node);
        }
    }

    Ok(match emitted.len() {
        0 => None,
        1 => Some(emitted.into_iter().next().expect("length checked above")),
        _ => Some(Working::Parallel(emitted)),
    })
}
