//! Message-packer leaves (spec §4.2): stateful producers that fill
//! whatever free space remains in a given message.

use std::sync::Arc;

use crate::config::PlannerLimits;
use crate::error::PackError;
use crate::ledger::LedgerOps;

/// A one-shot, stateful producer of instructions sized to fit whatever
/// capacity is offered to it.
///
/// Exposed as an owned trait object with explicit `done`/`pack_to_capacity`
/// methods rather than a restartable generator, since a fresh instance is
/// meant to be obtained per [`PackerFactory::get_packer`] call.
pub trait Packer<L: LedgerOps>: Send {
    /// Whether all bytes have been emitted.
    fn done(&self) -> bool;

    /// Attempt to append one or more instructions into `message`, emitting
    /// as many bytes as will fit while leaving the result within
    /// `limits.tx_size_limit`.
    fn pack_to_capacity(
        &mut self,
        message: &L::Message,
        ops: &L,
        limits: &PlannerLimits,
    ) -> Result<L::Message, PackError>;
}

/// Factory for fresh [`Packer`] instances. A [`InstructionPlan::MessagePacker`]
/// leaf stores one of these rather than a packer directly, since traversals
/// like `transform` may invoke it more than once.
pub trait PackerFactory<L: LedgerOps>: Send + Sync {
    fn get_packer(&self) -> Box<dyn Packer<L>>;
}

// ---------------------------------------------------------------------------
// Linear byte-stream packer
// ---------------------------------------------------------------------------

type ByteGenerator<L> =
    Arc<dyn Fn(u64, u64) -> <L as LedgerOps>::Instruction + Send + Sync>;

/// Splits a `total_length`-byte logical payload across however many
/// instructions fit, via `generator(offset, length) -> Instruction`.
pub struct LinearBytePackerFactory<L: LedgerOps> {
    total_length: u64,
    generator: ByteGenerator<L>,
}

impl<L: LedgerOps> LinearBytePackerFactory<L> {
    pub fn new(
        total_length: u64,
        generator: impl Fn(u64, u64) -> L::Instruction + Send + Sync + 'static,
    ) -> Self {
        Self {
            total_length,
            generator: Arc::new(generator),
        }
    }
}

impl<L: LedgerOps> PackerFactory<L> for LinearBytePackerFactory<L> {
    fn get_packer(&self) -> Box<dyn Packer<L>> {
        Box::new(LinearBytePacker {
            total_length: self.total_length,
            offset: 0,
            generator: self.generator.clone(),
        })
    }
}

struct LinearBytePacker<L: LedgerOps> {
    total_length: u64,
    offset: u64,
    generator: ByteGenerator<L>,
}

impl<L: LedgerOps> Packer<L> for LinearBytePacker<L> {
    fn done(&self) -> bool {
        self.offset >= self.total_length
    }

    fn pack_to_capacity(
        &mut self,
        message: &L::Message,
        ops: &L,
        limits: &PlannerLimits,
    ) -> Result<L::Message, PackError> {
        if self.done() {
            return Err(PackError::AlreadyComplete);
        }

        let probe = (self.generator)(self.offset, 0);
        let probed = ops.append(std::slice::from_ref(&probe), message);
        let base_size = ops.measure(message) as i64;
        let probed_size = ops.measure(&probed) as i64;
        // -1 reserves one byte for shortU16 growth in the transaction header.
        let free = limits.tx_size_limit as i64 - probed_size - 1;

        if free <= 0 {
            return Err(PackError::CannotAccommodate {
                bytes_required: ((probed_size - base_size + 1).max(0)) as u32,
                bytes_free: limits.tx_size_limit as i64 - base_size - 1,
            });
        }

        let remaining = self.total_length - self.offset;
        let chunk = remaining.min(free as u64);
        let instruction = (self.generator)(self.offset, chunk);
        self.offset += chunk;
        Ok(ops.append(std::slice::from_ref(&instruction), message))
    }
}

// ---------------------------------------------------------------------------
// Instruction-list packer
// ---------------------------------------------------------------------------

/// Appends instructions from a fixed list starting at the current index.
///
/// Per spec §4.2's documented (source-following) semantics: when the
/// *first* addition attempted in a call overflows, the call fails with
/// [`PackError::CannotAccommodate`]; when a *later* addition overflows,
/// progress is kept up to and including the overflowing instruction, and
/// `index` advances past it.
pub struct InstructionListPackerFactory<L: LedgerOps> {
    instructions: Vec<L::Instruction>,
}

impl<L: LedgerOps> InstructionListPackerFactory<L> {
    pub fn new(instructions: Vec<L::Instruction>) -> Self {
        Self { instructions }
    }
}

impl<L: LedgerOps> PackerFactory<L> for InstructionListPackerFactory<L> {
    fn get_packer(&self) -> Box<dyn Packer<L>> {
        Box::new(InstructionListPacker {
            instructions: self.instructions.clone(),
            index: 0,
        })
    }
}

struct InstructionListPacker<L: LedgerOps> {
    instructions: Vec<L::Instruction>,
    index: usize,
}

impl<L: LedgerOps> Packer<L> for InstructionListPacker<L> {
    fn done(&self) -> bool {
        self.index >= self.instructions.len()
    }

    fn pack_to_capacity(
        &mut self,
        message: &L::Message,
        ops: &L,
        limits: &PlannerLimits,
    ) -> Result<L::Message, PackError> {
        if self.done() {
            return Err(PackError::AlreadyComplete);
        }

        let mut current = message.clone();
        let mut appended_any = false;

        while self.index < self.instructions.len() {
            let before_size = ops.measure(&current) as i64;
            let next = ops.append(std::slice::from_ref(&self.instructions[self.index]), &current);
            let next_size = ops.measure(&next) as i64;

            if next_size > limits.tx_size_limit as i64 {
                if !appended_any {
                    return Err(PackError::CannotAccommodate {
                        bytes_required: ((next_size - before_size + 1).max(0)) as u32,
                        bytes_free: limits.tx_size_limit as i64 - before_size - 1,
                    });
                }
                // Commit up to and including the overflowing instruction.
                self.index += 1;
                return Ok(next);
            }

            current = next;
            self.index += 1;
            appended_any = true;
        }

        Ok(current)
    }
}

// ---------------------------------------------------------------------------
// Realloc packer
// ---------------------------------------------------------------------------

/// Default chunk size for [`ReallocPackerFactory`] per spec §4.2.
pub const REALLOC_LIMIT: u64 = 10_240;

/// Produces `ceil(total_size / realloc_limit)` instructions via
/// `generator(chunk_size) -> Instruction`; all but the last have size
/// `realloc_limit`, the last has whatever remains. Delegates the actual
/// packing to [`InstructionListPackerFactory`].
///
/// `realloc_limit` is taken from the [`PlannerLimits::realloc_limit`] a
/// caller's planner is configured with — `PackerFactory::get_packer` isn't
/// handed a `PlannerLimits`, so chunking is deferred to the first
/// `pack_to_capacity` call, where one is finally available. Use
/// [`with_realloc_limit`](Self::with_realloc_limit) to pin a chunk size
/// regardless of the planner's limits.
pub struct ReallocPackerFactory<L: LedgerOps> {
    total_size: u64,
    realloc_limit_override: Option<u64>,
    generator: Arc<dyn Fn(u64) -> L::Instruction + Send + Sync>,
}

impl<L: LedgerOps> ReallocPackerFactory<L> {
    pub fn new(total_size: u64, generator: impl Fn(u64) -> L::Instruction + Send + Sync + 'static) -> Self {
        Self {
            total_size,
            realloc_limit_override: None,
            generator: Arc::new(generator),
        }
    }

    pub fn with_realloc_limit(mut self, realloc_limit: u64) -> Self {
        self.realloc_limit_override = Some(realloc_limit);
        self
    }
}

impl<L: LedgerOps> PackerFactory<L> for ReallocPackerFactory<L> {
    fn get_packer(&self) -> Box<dyn Packer<L>> {
        Box::new(ReallocPacker {
            total_size: self.total_size,
            realloc_limit_override: self.realloc_limit_override,
            generator: self.generator.clone(),
            inner: None,
        })
    }
}

struct ReallocPacker<L: LedgerOps> {
    total_size: u64,
    realloc_limit_override: Option<u64>,
    generator: Arc<dyn Fn(u64) -> L::Instruction + Send + Sync>,
    inner: Option<InstructionListPacker<L>>,
}

impl<L: LedgerOps> ReallocPacker<L> {
    fn ensure_chunked(&mut self, limits: &PlannerLimits) -> &mut InstructionListPacker<L> {
        let generator = &self.generator;
        let total_size = self.total_size;
        let realloc_limit = self.realloc_limit_override.unwrap_or(limits.realloc_limit).max(1);
        self.inner.get_or_insert_with(|| {
            let mut instructions = Vec::new();
            let mut remaining = total_size;
            while remaining > 0 {
                let chunk = remaining.min(realloc_limit);
                instructions.push(generator(chunk));
                remaining -= chunk;
            }
            InstructionListPacker {
                instructions,
                index: 0,
            }
        })
    }
}

impl<L: LedgerOps> Packer<L> for ReallocPacker<L> {
    fn done(&self) -> bool {
        match &self.inner {
            Some(inner) => inner.done(),
            None => self.total_size == 0,
        }
    }

    fn pack_to_capacity(
        &mut self,
        message: &L::Message,
        ops: &L,
        limits: &PlannerLimits,
    ) -> Result<L::Message, PackError> {
        if self.total_size == 0 {
            return Err(PackError::AlreadyComplete);
        }
        self.ensure_chunked(limits).pack_to_capacity(message, ops, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeInstruction, FakeLedger};

    fn limits(tx_size_limit: u32) -> PlannerLimits {
        PlannerLimits {
            tx_size_limit,
            ..PlannerLimits::default()
        }
    }

    #[test]
    fn linear_packer_round_trips_total_length() {
        let ledger = FakeLedger::default();
        let factory =
            LinearBytePackerFactory::<FakeLedger>::new(37, |offset, len| {
                FakeInstruction::new(format!("chunk@{offset}"), len as u32)
            });
        let limits = limits(50);
        let mut packer = factory.get_packer();
        let mut message = ledger.empty_message();
        let mut total = 0u64;
        while !packer.done() {
            message = packer.pack_to_capacity(&message, &ledger, &limits).unwrap();
            total = message.0.iter().map(|i| i.size as u64).sum();
        }
        assert_eq!(total, 37);
    }

    #[test]
    fn linear_packer_fresh_instance_per_factory_call() {
        let factory = LinearBytePackerFactory::<FakeLedger>::new(10, |o, l| {
            FakeInstruction::new(format!("{o}:{l}"), l as u32)
        });
        let a = factory.get_packer();
        let b = factory.get_packer();
        assert!(!a.done());
        assert!(!b.done());
    }

    #[test]
    fn linear_packer_fails_when_not_even_one_byte_fits() {
        let ledger = FakeLedger::default();
        let factory = LinearBytePackerFactory::<FakeLedger>::new(10, |o, l| {
            FakeInstruction::new(format!("{o}:{l}"), l.max(1) as u32)
        });
        // tx_size_limit so tiny even the zero-length probe doesn't fit with -1 reserve.
        let limits = limits(ledger.measure(&ledger.empty_message()));
        let mut packer = factory.get_packer();
        let err = packer
            .pack_to_capacity(&ledger.empty_message(), &ledger, &limits)
            .unwrap_err();
        assert!(matches!(err, PackError::CannotAccommodate { .. }));
    }

    #[test]
    fn linear_packer_already_complete_after_done() {
        let ledger = FakeLedger::default();
        let factory = LinearBytePackerFactory::<FakeLedger>::new(1, |o, l| {
            FakeInstruction::new(format!("{o}:{l}"), l as u32)
        });
        let limits = limits(1000);
        let mut packer = factory.get_packer();
        let message = packer
            .pack_to_capacity(&ledger.empty_message(), &ledger, &limits)
            .unwrap();
        assert!(packer.done());
        let err = packer.pack_to_capacity(&message, &ledger, &limits).unwrap_err();
        assert!(matches!(err, PackError::AlreadyComplete));
    }

    #[test]
    fn instruction_list_packer_commits_through_overflowing_instruction() {
        let ledger = FakeLedger::default();
        let factory = InstructionListPackerFactory::<FakeLedger>::new(vec![
            FakeInstruction::new("a", 5),
            FakeInstruction::new("b", 5),
            FakeInstruction::new("c", 5),
        ]);
        // overhead(1) + 5 + 5 = 11 fits; + another 5 = 16 which overflows a 12-byte limit.
        let limits = limits(12);
        let mut packer = factory.get_packer();
        let message = packer
            .pack_to_capacity(&ledger.empty_message(), &ledger, &limits)
            .unwrap();
        // committed through "b" (the overflowing instruction), index advanced past it.
        assert_eq!(message.0.len(), 2);
        assert_eq!(packer.done(), false);
    }

    #[test]
    fn instruction_list_packer_fails_when_first_instruction_overflows() {
        let ledger = FakeLedger::default();
        let factory =
            InstructionListPackerFactory::<FakeLedger>::new(vec![FakeInstruction::new("a", 100)]);
        let limits = limits(12);
        let mut packer = factory.get_packer();
        let err = packer
            .pack_to_capacity(&ledger.empty_message(), &ledger, &limits)
            .unwrap_err();
        assert!(matches!(err, PackError::CannotAccommodate { .. }));
    }

    #[test]
    fn realloc_packer_splits_into_expected_chunks() {
        let ledger = FakeLedger::default();
        let factory = ReallocPackerFactory::<FakeLedger>::new(25_000, |chunk| {
            FakeInstruction::new(format!("realloc:{chunk}"), chunk as u32)
        })
        .with_realloc_limit(10_240);
        let limits = limits(1_000_000);
        let mut packer = factory.get_packer();
        let mut message = ledger.empty_message();
        while !packer.done() {
            message = packer.pack_to_capacity(&message, &ledger, &limits).unwrap();
        }
        let sizes: Vec<u32> = message.0.iter().map(|i| i.size).collect();
        assert_eq!(sizes, vec![10_240, 10_240, 4_520]);
    }

    #[test]
    fn realloc_packer_without_override_uses_planner_limits_realloc_limit() {
        let ledger = FakeLedger::default();
        let factory = ReallocPackerFactory::<FakeLedger>::new(25_000, |chunk| {
            FakeInstruction::new(format!("realloc:{chunk}"), chunk as u32)
        });
        let limits = PlannerLimits {
            tx_size_limit: 1_000_000,
            realloc_limit: 10_240,
        };
        let mut packer = factory.get_packer();
        let mut message = ledger.empty_message();
        while !packer.done() {
            message = packer.pack_to_capacity(&message, &ledger, &limits).unwrap();
        }
        let sizes: Vec<u32> = message.0.iter().map(|i| i.size).collect();
        assert_eq!(sizes, vec![10_240, 10_240, 4_520]);
    }

    #[test]
    fn realloc_packer_zero_remainder_uses_full_last_chunk() {
        let ledger = FakeLedger::default();
        let factory = ReallocPackerFactory::<FakeLedger>::new(20_480, |chunk| {
            FakeInstruction::new(format!("realloc:{chunk}"), chunk as u32)
        })
        .with_realloc_limit(10_240);
        let limits = limits(1_000_000);
        let mut packer = factory.get_packer();
        let mut message = ledger.empty_message();
        while !packer.done() {
            message = packer.pack_to_capacity(&message, &ledger, &limits).unwrap();
        }
        let sizes: Vec<u32> = message.0.iter().map(|i| i.size).collect();
        assert_eq!(sizes, vec![10_240, 10_240]);
    }
}
