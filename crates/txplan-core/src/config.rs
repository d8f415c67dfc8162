//! Planner configuration (spec §4.9).
//!
//! Deliberately not loaded from a file or environment: the planner's
//! byte-budget constants are a property of the wire format the caller's
//! [`LedgerOps`](crate::ledger::LedgerOps) implementation targets, not an
//! operator-tunable setting.

/// Byte-budget limits the planner and its packers are built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerLimits {
    /// Hard per-transaction serialized-message byte budget.
    pub tx_size_limit: u32,
    /// Chunk size used by [`ReallocPackerFactory`](crate::plan::packer::ReallocPackerFactory).
    pub realloc_limit: u64,
}

/// Solana's wire-level transaction size limit (IPv6 MTU minus headers),
/// and this crate's default [`PlannerLimits::tx_size_limit`].
pub const TX_SIZE_LIMIT: u32 = 1_232;

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            tx_size_limit: TX_SIZE_LIMIT,
            realloc_limit: crate::plan::packer::REALLOC_LIMIT,
        }
    }
}
