//! Minimal [`LedgerOps`] fixture shared by unit tests across this crate.
//!
//! Messages are modeled as a flat `Vec<FakeInstruction>` with a fixed
//! per-message overhead, which is all the planner/executor/packer logic
//! needs to exercise byte-budget behavior without pulling in a real wire
//! format.

#![cfg(test)]

use crate::ledger::LedgerOps;

/// Per-message overhead charged by [`FakeLedger::measure`], standing in
/// for a real format's signature/header bytes.
pub const FAKE_MESSAGE_OVERHEAD: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeInstruction {
    pub tag: String,
    pub size: u32,
}

impl FakeInstruction {
    pub fn new(tag: impl Into<String>, size: u32) -> Self {
        Self {
            tag: tag.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeMessage(pub Vec<FakeInstruction>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FakeLedger;

impl LedgerOps for FakeLedger {
    type Instruction = FakeInstruction;
    type Message = FakeMessage;
    type Signature = u64;
    type HookError = FakeHookError;

    fn measure(&self, message: &Self::Message) -> u32 {
        FAKE_MESSAGE_OVERHEAD + message.0.iter().map(|i| i.size).sum::<u32>()
    }

    fn append(&self, instructions: &[Self::Instruction], message: &Self::Message) -> Self::Message {
        let mut out = message.0.clone();
        out.extend_from_slice(instructions);
        FakeMessage(out)
    }
}

impl FakeLedger {
    pub fn empty_message(&self) -> FakeMessage {
        FakeMessage::default()
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum FakeHookError {
    #[error("fake hook failed")]
    Failed,
}
