// Copyright (c) 2024 Botho Foundation

//! Pluggable mixing policies.
//!
//! A policy is one mixing strategy: it decides which coins to commit to a
//! round and what outputs those coins should pay to. Policies never see the
//! round client itself. Every notification hands them a read-only
//! [`RoundView`], and coin selection additionally hands them a
//! [`SelectionContext`] through which they claim coins.
//!
//! # Policies
//!
//! - [`PrivacyPolicy`]: claim as many coins as the cap allows
//! - [`ConsolidationPolicy`]: same claim rule, one output for all inputs
//! - [`PaymentBatchingPolicy`]: fund payment requests from contributed coins
//! - [`DirectPaymentPolicy`]: fund payments settled directly with the payee
//!
//! # Lifecycle
//!
//! ```text
//! attach ──► on_phase_changed ──► on_coin_selection_started ──► plan_outputs
//!   │                 │                        │
//!   │                 └──── Err(PolicyError) ──┴──► failed set ──► on_detached
//!   └──────────────────────── dispose ─────────────────────────────► on_detached
//! ```

mod consolidation;
mod direct_payment;
mod payment;
mod privacy;

pub use consolidation::ConsolidationPolicy;
pub use direct_payment::DirectPaymentPolicy;
pub use payment::{PaymentBatchingPolicy, PaymentBook};
pub use privacy::PrivacyPolicy;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    coin::{Coin, PaymentRequest},
    error::{LedgerError, PolicyError},
    ledger::AllocationLedger,
    round::RoundState,
};

/// Handle of an attached policy, assigned in attachment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub usize);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only view of the round handed to policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundView {
    pub state: RoundState,
    pub registration_cap: usize,
}

/// What a policy may do while coin selection runs.
///
/// Claims go straight into the round's allocation ledger under the calling
/// policy's id, so an earlier policy's claims are already visible to every
/// later one.
pub struct SelectionContext<'a> {
    policy: PolicyId,
    round: RoundView,
    ledger: &'a mut AllocationLedger,
}

impl<'a> SelectionContext<'a> {
    pub(crate) fn new(
        policy: PolicyId,
        round: RoundView,
        ledger: &'a mut AllocationLedger,
    ) -> Self {
        Self {
            policy,
            round,
            ledger,
        }
    }

    /// Id of the policy this context belongs to.
    pub fn policy(&self) -> PolicyId {
        self.policy
    }

    pub fn round(&self) -> &RoundView {
        &self.round
    }

    /// How many more coins may be claimed before the round cap is reached.
    pub fn remaining_capacity(&self) -> usize {
        self.round.registration_cap.saturating_sub(self.ledger.len())
    }

    /// Unclaimed coins in pool order.
    pub fn unclaimed(&self) -> Vec<Coin> {
        self.ledger.unclaimed().cloned().collect()
    }

    /// Claim a coin for the calling policy.
    pub fn claim(&mut self, coin: &Coin) -> Result<(), LedgerError> {
        self.ledger.claim(coin.id, self.policy)
    }

    /// Coins the calling policy has claimed so far.
    pub fn claimed(&self) -> Vec<Coin> {
        self.ledger.claimed_by(self.policy)
    }

    pub fn ledger(&self) -> &AllocationLedger {
        self.ledger
    }
}

/// Role of a planned output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Mixed output back to the wallet.
    Mixed,
    /// Several inputs merged into one wallet output.
    Consolidated,
    /// Payment to a third party.
    Payment,
    /// Excess value returned to the wallet.
    Change,
}

/// An output a policy wants registered once the round reaches
/// output registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedOutput {
    /// Amount in picocredits, before coordinator fees.
    pub amount: u64,

    /// Payee address, or `None` for a fresh wallet address.
    pub destination: Option<String>,

    pub kind: OutputKind,
}

impl PlannedOutput {
    pub fn to_wallet(amount: u64, kind: OutputKind) -> Self {
        Self {
            amount,
            destination: None,
            kind,
        }
    }

    pub fn payment(request: &PaymentRequest) -> Self {
        Self {
            amount: request.amount,
            destination: Some(request.destination.clone()),
            kind: OutputKind::Payment,
        }
    }
}

/// One mixed output per input coin.
pub fn mixed_outputs(coins: &[Coin]) -> Vec<PlannedOutput> {
    coins
        .iter()
        .map(|coin| PlannedOutput::to_wallet(coin.amount, OutputKind::Mixed))
        .collect()
}

/// A mixing strategy attached to a round client.
#[async_trait]
pub trait Policy: Send {
    /// Short name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// The round entered a new phase.
    async fn on_phase_changed(&mut self, _round: &RoundView) -> Result<(), PolicyError> {
        Ok(())
    }

    /// Input registration opened; claim coins through `ctx`.
    ///
    /// Returning an error removes the policy from the round. Coins it
    /// already claimed stay claimed.
    async fn on_coin_selection_started(
        &mut self,
        ctx: &mut SelectionContext<'_>,
    ) -> Result<(), PolicyError>;

    /// Outputs to register for the coins this policy claimed.
    fn plan_outputs(&self, claimed: &[Coin]) -> Vec<PlannedOutput> {
        mixed_outputs(claimed)
    }

    /// Payment requests this policy has not funded yet.
    fn pending_payments(&self) -> Vec<PaymentRequest> {
        Vec::new()
    }

    /// The policy left the active set and will not be notified again.
    fn on_detached(&mut self) {}
}
