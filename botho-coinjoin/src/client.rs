// Copyright (c) 2024 Botho Foundation

//! Round client: the facade a wallet uses to take part in one round.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use botho_coinjoin::{
//!     NullCoordinator, Phase, PrivacyPolicy, RoundClient, RoundId, RoundState,
//! };
//!
//! # async fn run(coins: Vec<botho_coinjoin::Coin>) -> anyhow::Result<()> {
//! let round = RoundState::new(RoundId([7u8; 32]), Phase::InputRegistration);
//! let client = RoundClient::builder(round, Arc::new(NullCoordinator))
//!     .coins(coins)
//!     .policy(Box::new(PrivacyPolicy::new()))
//!     .build()?;
//!
//! let mut events = client.subscribe();
//! let worker = client.start().expect("first start");
//!
//! client.on_round_update(round.with_phase(Phase::ConnectionConfirmation));
//! # let _ = events.recv().await;
//! # client.dispose().await;
//! # worker.await??;
//! # Ok(())
//! # }
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::{Mutex as SyncMutex, RwLock};
use rand::Rng;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    coin::{Coin, PaymentRequest},
    config::CoinJoinConfig,
    coordinator::{Coordinator, NoProofs, OwnershipProofProvider},
    error::{ConfigError, PolicyError, RoundError},
    events::{EventBroadcaster, RoundEvent},
    ledger::AllocationLedger,
    policy::{Policy, PolicyId},
    registry::{PolicyFailure, PolicyRegistry},
    round::RoundState,
    scheduler::{phase_queue, PhaseSubmitter, PhaseWorker, RoundShared},
};

/// Builder for [`RoundClient`].
pub struct RoundClientBuilder {
    initial: RoundState,
    coordinator: Arc<dyn Coordinator>,
    proofs: Arc<dyn OwnershipProofProvider>,
    config: CoinJoinConfig,
    coins: Vec<Coin>,
    policies: Vec<Box<dyn Policy>>,
}

impl RoundClientBuilder {
    pub fn config(mut self, config: CoinJoinConfig) -> Self {
        self.config = config;
        self
    }

    /// Coins the wallet makes available to this round.
    pub fn coins(mut self, coins: Vec<Coin>) -> Self {
        self.coins = coins;
        self
    }

    /// Attach a policy. Policies pick coins in the order they are attached.
    pub fn policy(mut self, policy: Box<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn ownership_proofs(mut self, proofs: Arc<dyn OwnershipProofProvider>) -> Self {
        self.proofs = proofs;
        self
    }

    pub fn build(self) -> Result<RoundClient, ConfigError> {
        self.build_with_rng(&mut rand::thread_rng())
    }

    /// Build the client, drawing the registration cap from `rng`.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<RoundClient, ConfigError> {
        self.config.validate()?;
        let registration_cap = self.config.draw_registration_cap(rng);

        let cancel = CancellationToken::new();
        let mut registry = PolicyRegistry::with_cancellation(cancel.clone());
        for policy in self.policies {
            registry.attach(policy);
        }

        let shared = Arc::new(RoundShared {
            state: RwLock::new(self.initial),
            registration_cap,
            registry: Mutex::new(registry),
            events: EventBroadcaster::new(self.config.event_capacity),
            cancel,
        });

        let (submitter, queue) = phase_queue();
        submitter.submit(self.initial.phase);

        let worker = PhaseWorker::new(
            shared.clone(),
            queue,
            AllocationLedger::new(self.coins),
            self.coordinator,
            self.proofs,
        );

        info!(
            round = %self.initial.round_id,
            phase = %self.initial.phase,
            registration_cap,
            "round client created"
        );

        Ok(RoundClient {
            shared,
            submitter,
            worker: SyncMutex::new(Some(worker)),
            disposed: AtomicBool::new(false),
        })
    }
}

/// One wallet's participation in one round.
pub struct RoundClient {
    shared: Arc<RoundShared>,
    submitter: PhaseSubmitter,
    worker: SyncMutex<Option<PhaseWorker>>,
    disposed: AtomicBool,
}

impl RoundClient {
    pub fn builder(initial: RoundState, coordinator: Arc<dyn Coordinator>) -> RoundClientBuilder {
        RoundClientBuilder {
            initial,
            coordinator,
            proofs: Arc::new(NoProofs),
            config: CoinJoinConfig::default(),
            coins: Vec::new(),
            policies: Vec::new(),
        }
    }

    /// Spawn the phase worker on the current tokio runtime.
    ///
    /// Returns `None` if the worker was already started. Fatal round errors
    /// come out of the returned handle.
    pub fn start(&self) -> Option<JoinHandle<Result<(), RoundError>>> {
        let worker = self.worker.lock().take()?;
        Some(tokio::spawn(worker.run()))
    }

    /// Record a new round snapshot from the coordinator.
    ///
    /// The phase is queued only when it differs from the previous one.
    /// Snapshots of another round are ignored.
    pub fn on_round_update(&self, new_state: RoundState) {
        if self.is_disposed() {
            return;
        }

        let previous = {
            let mut state = self.shared.state.write();
            if state.round_id != new_state.round_id {
                warn!(
                    round = %state.round_id,
                    update = %new_state.round_id,
                    "ignoring update for another round"
                );
                return;
            }
            std::mem::replace(&mut *state, new_state)
        };

        if previous.phase != new_state.phase {
            debug!(from = %previous.phase, to = %new_state.phase, "round phase changed");
            self.submitter.submit(new_state.phase);
        }
    }

    /// Remove a policy from the round.
    ///
    /// Returns `None` if the policy was not active.
    pub async fn fail_policy(&self, id: PolicyId, error: PolicyError) -> Option<PolicyFailure> {
        let failure = self.shared.registry.lock().await.fail(id, error)?;
        self.shared
            .events
            .policy_failed(failure.id, failure.name, failure.error.clone());
        Some(failure)
    }

    /// Tear the client down.
    ///
    /// Drops every event subscription, stops the worker and detaches all
    /// policies. A policy callback still in flight is abandoned rather than
    /// awaited. Calling it again does nothing.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.events.clear();
        self.shared.cancel.cancel();
        self.shared.registry.lock().await.detach_all();

        info!(round = %self.shared.state.read().round_id, "round client disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Registration cap drawn for this round.
    pub fn registration_cap(&self) -> usize {
        self.shared.registration_cap
    }

    /// Latest round snapshot.
    pub fn round_state(&self) -> RoundState {
        *self.shared.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.shared.events.subscribe()
    }

    pub async fn failed_policies(&self) -> Vec<PolicyFailure> {
        self.shared.registry.lock().await.failed()
    }

    pub async fn active_policies(&self) -> Vec<PolicyId> {
        self.shared.registry.lock().await.active_ids()
    }

    /// Payment requests that still need a round.
    pub async fn pending_payments(&self) -> Vec<PaymentRequest> {
        self.shared.registry.lock().await.pending_payments()
    }
}

impl Drop for RoundClient {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
