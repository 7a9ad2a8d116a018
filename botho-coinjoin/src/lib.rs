// Copyright (c) 2024 Botho Foundation

//! Botho CoinJoin Round Participant
//!
//! Wallet-side controller for coordinator-run mixing rounds. The coordinator
//! announces phases; the client tracks the round, lets pluggable policies
//! decide which coins to commit, and drives registration forward.
//!
//! ## Components
//!
//! - [`RoundClient`]: facade owned by the wallet, one per round
//! - [`scheduler`]: bounded phase queue and the single phase worker
//! - [`PolicyRegistry`]: active and failed policies, deterministic dispatch
//! - [`AllocationLedger`]: which policy committed which coin
//! - [`policy`]: the built-in mixing strategies
//!
//! ## Guarantees
//!
//! - Every allocated coin comes from the round's pool and has one owner
//! - The allocation never exceeds the registration cap drawn for the round
//! - Each distinct phase is handled once, in protocol order; a phase that
//!   skips ahead, goes back, or no longer matches the round's latest state
//!   aborts the round
//! - Disposal never waits on a policy that has stopped responding
//! - A failing policy is removed without affecting the others

pub mod client;
pub mod coin;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod ledger;
pub mod policy;
pub mod registry;
pub mod round;
pub mod scheduler;
pub mod selection;

pub use client::{RoundClient, RoundClientBuilder};
pub use coin::{Coin, CoinId, PaymentRequest};
pub use config::CoinJoinConfig;
pub use coordinator::{
    Coordinator, CredentialExchange, NoProofs, NullCoordinator, OwnershipProof,
    OwnershipProofProvider, RegistrationInput,
};
pub use error::{ConfigError, LedgerError, PolicyError, RoundError};
pub use events::{EventBroadcaster, RoundEvent};
pub use ledger::{Allocation, AllocationEntry, AllocationLedger};
pub use policy::{
    ConsolidationPolicy, DirectPaymentPolicy, OutputKind, PaymentBatchingPolicy, PlannedOutput,
    Policy, PolicyId, PrivacyPolicy, RoundView, SelectionContext,
};
pub use registry::{PolicyFailure, PolicyRegistry};
pub use round::{Phase, RoundId, RoundState};
