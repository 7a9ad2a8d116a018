// Copyright (c) 2024 Botho Foundation

//! Registry of the policies attached to a round client.
//!
//! Notifications go out in attachment order. Every dispatch walks a snapshot
//! of the active ids taken before the first call, so a policy that fails
//! halfway through neither skips nor repeats a sibling. A failed policy is
//! detached on the spot: it moves to the failed set, gets its
//! [`Policy::on_detached`] call, and is never notified again.
//!
//! A dispatch in progress stops at the next policy boundary once the round
//! is cancelled, and a policy still being awaited at that moment is
//! abandoned. Disposal therefore never waits on a stalled policy.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    coin::PaymentRequest,
    error::PolicyError,
    ledger::{Allocation, AllocationLedger},
    policy::{mixed_outputs, PlannedOutput, Policy, PolicyId, RoundView, SelectionContext},
};

struct Attached {
    id: PolicyId,
    policy: Box<dyn Policy>,
}

struct Failed {
    failure: PolicyFailure,
    policy: Box<dyn Policy>,
}

/// Record of a policy that left the round because it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyFailure {
    pub id: PolicyId,
    pub name: &'static str,
    pub error: PolicyError,
}

/// Active and failed policies of one round client.
#[derive(Default)]
pub struct PolicyRegistry {
    active: Vec<Attached>,
    failed: Vec<Failed>,
    next_id: usize,
    cancel: CancellationToken,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose dispatches stop when `cancel` fires.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// Attach a policy and return its id.
    pub fn attach(&mut self, policy: Box<dyn Policy>) -> PolicyId {
        let id = PolicyId(self.next_id);
        self.next_id += 1;
        debug!(policy = %id, name = policy.name(), "policy attached");
        self.active.push(Attached { id, policy });
        id
    }

    /// Ids of the active policies in attachment order.
    pub fn active_ids(&self) -> Vec<PolicyId> {
        self.active.iter().map(|a| a.id).collect()
    }

    pub fn is_active(&self, id: PolicyId) -> bool {
        self.active.iter().any(|a| a.id == id)
    }

    pub fn is_failed(&self, id: PolicyId) -> bool {
        self.failed.iter().any(|f| f.failure.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Failures so far, in the order they happened.
    pub fn failed(&self) -> Vec<PolicyFailure> {
        self.failed.iter().map(|f| f.failure.clone()).collect()
    }

    /// Tell every active policy about a phase change.
    pub async fn notify_phase_changed(&mut self, round: &RoundView) -> Vec<PolicyFailure> {
        let mut failures = Vec::new();

        for id in self.active_ids() {
            if self.cancel.is_cancelled() {
                debug!(policy = %id, "dispatch cancelled");
                break;
            }
            let Some(attached) = self.active.iter_mut().find(|a| a.id == id) else {
                continue;
            };
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(policy = %id, "phase notification abandoned");
                    break;
                }
                result = attached.policy.on_phase_changed(round) => result,
            };
            if let Err(error) = result {
                failures.extend(self.fail(id, error));
            }
        }

        failures
    }

    /// Let every active policy claim coins, one after the other.
    pub async fn notify_coin_selection_started(
        &mut self,
        round: RoundView,
        ledger: &mut AllocationLedger,
    ) -> Vec<PolicyFailure> {
        let mut failures = Vec::new();

        for id in self.active_ids() {
            if self.cancel.is_cancelled() {
                debug!(policy = %id, "dispatch cancelled");
                break;
            }
            let Some(attached) = self.active.iter_mut().find(|a| a.id == id) else {
                continue;
            };
            let mut ctx = SelectionContext::new(id, round, ledger);
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(policy = %id, "coin selection abandoned");
                    break;
                }
                result = attached.policy.on_coin_selection_started(&mut ctx) => result,
            };
            if let Err(error) = result {
                failures.extend(self.fail(id, error));
            }
        }

        failures
    }

    /// Move a policy from the active set to the failed set.
    ///
    /// Returns `None` if the policy is not active, which makes repeated
    /// failure reports harmless.
    pub fn fail(&mut self, id: PolicyId, error: PolicyError) -> Option<PolicyFailure> {
        let pos = self.active.iter().position(|a| a.id == id)?;
        let Attached { id, mut policy } = self.active.remove(pos);

        warn!(policy = %id, name = policy.name(), "policy failed: {}", error);
        policy.on_detached();

        let failure = PolicyFailure {
            id,
            name: policy.name(),
            error,
        };
        self.failed.push(Failed {
            failure: failure.clone(),
            policy,
        });
        Some(failure)
    }

    /// Detach and drop every policy, active or failed.
    pub fn detach_all(&mut self) {
        for attached in self.active.iter_mut() {
            attached.policy.on_detached();
        }
        debug!(
            active = self.active.len(),
            failed = self.failed.len(),
            "detaching all policies"
        );
        self.active.clear();
        self.failed.clear();
    }

    /// Outputs for a final allocation.
    ///
    /// Active policies plan for their own coins in attachment order. Coins
    /// whose owner is no longer active are remixed one output each.
    pub fn plan_outputs(&self, allocation: &Allocation) -> Vec<PlannedOutput> {
        let mut outputs = Vec::new();

        for attached in &self.active {
            let coins = allocation.coins_of(attached.id);
            if !coins.is_empty() {
                outputs.extend(attached.policy.plan_outputs(&coins));
            }
        }

        let orphaned: Vec<_> = allocation
            .entries()
            .iter()
            .filter(|e| !self.is_active(e.policy))
            .map(|e| e.coin.clone())
            .collect();
        outputs.extend(mixed_outputs(&orphaned));

        outputs
    }

    /// Payment requests no policy has funded, active policies first.
    pub fn pending_payments(&self) -> Vec<PaymentRequest> {
        self.active
            .iter()
            .map(|a| &a.policy)
            .chain(self.failed.iter().map(|f| &f.policy))
            .flat_map(|policy| policy.pending_payments())
            .collect()
    }
}
