// Copyright (c) 2024 Botho Foundation

//! Outward notifications about round progress.
//!
//! Within one input registration the order is always
//! `PhaseChanged`, `CoinSelectionStarted`, any `PolicyFailed`,
//! `CoinSelectionFinished`, `CoinRegistrationFinished`.

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::{
    coin::Coin,
    error::PolicyError,
    ledger::Allocation,
    policy::PolicyId,
    round::RoundState,
};

/// Something observable happened in the round.
#[derive(Debug, Clone)]
pub enum RoundEvent {
    /// The worker accepted a new phase.
    PhaseChanged { state: RoundState },

    /// Policies are about to claim coins.
    CoinSelectionStarted { state: RoundState },

    /// Coin selection is over; the allocation is final for this round.
    CoinSelectionFinished { allocation: Allocation },

    /// The coordinator confirmed these inputs.
    CoinRegistrationFinished { coins: Vec<Coin> },

    /// A policy was removed from the round.
    PolicyFailed {
        policy: PolicyId,
        name: &'static str,
        error: PolicyError,
    },
}

/// Fan-out of [`RoundEvent`]s to any number of subscribers.
///
/// Once cleared, no event is delivered again and every receiver sees the
/// channel close.
pub struct EventBroadcaster {
    sender: RwLock<Option<broadcast::Sender<RoundEvent>>>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: RwLock::new(Some(sender)),
        }
    }

    /// Create a new receiver for events.
    ///
    /// After [`clear`](Self::clear) the returned receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (_, receiver) = broadcast::channel(1);
                receiver
            }
        }
    }

    /// Send an event to all subscribers.
    pub fn send(&self, event: RoundEvent) {
        if let Some(sender) = self.sender.read().as_ref() {
            // No receivers is fine
            let _ = sender.send(event);
        }
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.sender.write().take();
    }

    pub fn is_cleared(&self) -> bool {
        self.sender.read().is_none()
    }

    pub fn phase_changed(&self, state: RoundState) {
        self.send(RoundEvent::PhaseChanged { state });
    }

    pub fn coin_selection_started(&self, state: RoundState) {
        self.send(RoundEvent::CoinSelectionStarted { state });
    }

    pub fn coin_selection_finished(&self, allocation: Allocation) {
        self.send(RoundEvent::CoinSelectionFinished { allocation });
    }

    pub fn coin_registration_finished(&self, coins: Vec<Coin>) {
        self.send(RoundEvent::CoinRegistrationFinished { coins });
    }

    pub fn policy_failed(&self, policy: PolicyId, name: &'static str, error: PolicyError) {
        self.send(RoundEvent::PolicyFailed {
            policy,
            name,
            error,
        });
    }
}
