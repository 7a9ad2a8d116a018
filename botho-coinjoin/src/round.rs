// Copyright (c) 2024 Botho Foundation

//! Round identity and phase snapshots published by the coordinator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phases of a coordinator-run round, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    InputRegistration,
    ConnectionConfirmation,
    OutputRegistration,
    TransactionSigning,
    Ended,
}

impl Phase {
    /// Number of distinct phase values.
    pub const COUNT: usize = 5;

    /// Every phase, in protocol order.
    pub const ALL: [Phase; Phase::COUNT] = [
        Phase::InputRegistration,
        Phase::ConnectionConfirmation,
        Phase::OutputRegistration,
        Phase::TransactionSigning,
        Phase::Ended,
    ];

    /// The phase that follows this one, or `None` for [`Phase::Ended`].
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::InputRegistration => Some(Phase::ConnectionConfirmation),
            Phase::ConnectionConfirmation => Some(Phase::OutputRegistration),
            Phase::OutputRegistration => Some(Phase::TransactionSigning),
            Phase::TransactionSigning => Some(Phase::Ended),
            Phase::Ended => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Ended)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::InputRegistration => "input-registration",
            Phase::ConnectionConfirmation => "connection-confirmation",
            Phase::OutputRegistration => "output-registration",
            Phase::TransactionSigning => "transaction-signing",
            Phase::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Identifier of a round as assigned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundId(pub [u8; 32]);

impl RoundId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for RoundId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Latest snapshot of a round as seen by this client.
///
/// Snapshots are replaced wholesale on every coordinator update; nothing
/// mutates a published snapshot in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub round_id: RoundId,
    pub phase: Phase,
}

impl RoundState {
    pub fn new(round_id: RoundId, phase: Phase) -> Self {
        Self { round_id, phase }
    }

    /// A fresh snapshot of the same round in another phase.
    pub fn with_phase(&self, phase: Phase) -> Self {
        Self {
            round_id: self.round_id,
            phase,
        }
    }
}
