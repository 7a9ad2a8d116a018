// Copyright (c) 2024 Botho Foundation

//! Error taxonomy for round participation.
//!
//! - [`RoundError`] is fatal. It ends the phase worker and is handed to the
//!   owner of the [`RoundClient`](crate::RoundClient) through the worker's
//!   join handle. Nothing is rolled back.
//! - [`PolicyError`] is recoverable. The registry absorbs it by moving the
//!   offending policy to the failed set; the round carries on without it.
//! - [`LedgerError`] is what a policy sees when it tries to claim a coin it
//!   may not claim. Policies usually turn it into a [`PolicyError`].

use thiserror::Error;

use crate::{coin::CoinId, policy::PolicyId, round::Phase};

/// Fatal errors raised by the phase worker.
#[derive(Debug, Error)]
pub enum RoundError {
    /// The dequeued phase is not the one that follows the last handled
    /// phase, or no longer matches the round's latest phase.
    #[error("phase desync: dequeued {dequeued}, expected {expected}, round is in {recorded}")]
    PhaseDesync {
        dequeued: Phase,
        expected: Phase,
        recorded: Phase,
    },

    /// Policies together claimed more coins than this round allows.
    #[error("over-allocation: {allocated} coins claimed, registration cap is {cap}")]
    OverAllocation { allocated: usize, cap: usize },

    /// The coordinator rejected or failed a phase action.
    #[error("coordinator failed during {phase}: {reason}")]
    Coordinator { phase: Phase, reason: String },

    /// The wallet could not produce an ownership proof for a coin.
    #[error("no ownership proof for coin {coin}: {reason}")]
    OwnershipProof { coin: CoinId, reason: String },
}

/// Recoverable failures of an individual policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The policy could not claim anything useful this round.
    #[error("coin selection failed: {0}")]
    SelectionFailure(String),

    /// The direct-settlement counterpart refused or failed the exchange.
    #[error("credential exchange failed: {0}")]
    CredentialExchange(String),

    /// A claim was rejected by the allocation ledger.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Claims the allocation ledger refuses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The coin is not part of this round's available set.
    #[error("coin {0} is not available in this round")]
    UnknownCoin(CoinId),

    /// Another policy (or the same one) already owns the coin.
    #[error("coin {coin} is already claimed by policy {owner}")]
    AlreadyClaimed { coin: CoinId, owner: PolicyId },

    /// Coin selection is over; the allocation is read-only.
    #[error("allocation is frozen")]
    Frozen,
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid registration cap range {min}..={max}")]
    InvalidCapRange { min: usize, max: usize },

    #[error("event_capacity must be greater than zero")]
    ZeroEventCapacity,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
