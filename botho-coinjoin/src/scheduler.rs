// Copyright (c) 2024 Botho Foundation

//! Phase scheduler: a bounded phase queue and the single worker draining it.
//!
//! ```text
//!  on_round_update ──try_send──► [ Phase::COUNT slots ] ──recv──► PhaseWorker
//!   (any context)            full? drop the phase        (one task per client)
//! ```
//!
//! The worker is the only place where policies run and the ledger changes,
//! so neither needs a lock of its own. Phases must arrive in protocol order,
//! starting from the phase the client was built with; anything else is a
//! desync. Cancellation is observed while waiting on the queue and between
//! policy callbacks. Coordinator calls already under way run to completion.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    coin::{Coin, CoinId},
    coordinator::{Coordinator, OwnershipProofProvider, RegistrationInput},
    error::RoundError,
    events::EventBroadcaster,
    ledger::AllocationLedger,
    policy::RoundView,
    registry::{PolicyFailure, PolicyRegistry},
    round::{Phase, RoundState},
};

/// Sending half of the phase queue.
#[derive(Debug, Clone)]
pub struct PhaseSubmitter {
    tx: mpsc::Sender<Phase>,
}

impl PhaseSubmitter {
    /// Enqueue a phase without waiting.
    ///
    /// Returns `false` if the phase was dropped because the queue is full or
    /// the worker is gone.
    pub fn submit(&self, phase: Phase) -> bool {
        match self.tx.try_send(phase) {
            Ok(()) => {
                debug!(%phase, "phase queued");
                true
            }
            Err(mpsc::error::TrySendError::Full(phase)) => {
                warn!(%phase, "phase queue full, dropping phase");
                false
            }
            Err(mpsc::error::TrySendError::Closed(phase)) => {
                debug!(%phase, "phase worker stopped, dropping phase");
                false
            }
        }
    }
}

/// Create a phase queue with one slot per distinct phase.
pub fn phase_queue() -> (PhaseSubmitter, mpsc::Receiver<Phase>) {
    let (tx, rx) = mpsc::channel(Phase::COUNT);
    (PhaseSubmitter { tx }, rx)
}

/// State shared between a round client and its worker.
pub(crate) struct RoundShared {
    pub state: RwLock<RoundState>,
    pub registration_cap: usize,
    pub registry: Mutex<PolicyRegistry>,
    pub events: EventBroadcaster,
    pub cancel: CancellationToken,
}

/// Consumes queued phases one at a time and drives the round through them.
pub(crate) struct PhaseWorker {
    shared: Arc<RoundShared>,
    queue: mpsc::Receiver<Phase>,
    ledger: AllocationLedger,
    coordinator: Arc<dyn Coordinator>,
    proofs: Arc<dyn OwnershipProofProvider>,
    registered: Vec<CoinId>,
    initial: Phase,
    last_processed: Option<Phase>,
}

impl PhaseWorker {
    pub fn new(
        shared: Arc<RoundShared>,
        queue: mpsc::Receiver<Phase>,
        ledger: AllocationLedger,
        coordinator: Arc<dyn Coordinator>,
        proofs: Arc<dyn OwnershipProofProvider>,
    ) -> Self {
        let initial = shared.state.read().phase;
        Self {
            shared,
            queue,
            ledger,
            coordinator,
            proofs,
            registered: Vec::new(),
            initial,
            last_processed: None,
        }
    }

    /// The only phase the worker will accept next.
    fn expected_phase(&self) -> Phase {
        match self.last_processed {
            None => self.initial,
            Some(last) => last.next().unwrap_or(last),
        }
    }

    /// Run until the round ends, the client is disposed, or a fatal error.
    pub async fn run(mut self) -> Result<(), RoundError> {
        let round_id = self.shared.state.read().round_id;
        info!(round = %round_id, cap = self.shared.registration_cap, "phase worker started");

        let result = self.run_loop().await;
        match &result {
            Ok(()) => info!(round = %round_id, "phase worker stopped"),
            Err(e) => error!(round = %round_id, "round participation abandoned: {}", e),
        }
        result
    }

    async fn run_loop(&mut self) -> Result<(), RoundError> {
        loop {
            if self.shared.cancel.is_cancelled() {
                debug!("phase worker cancelled");
                return Ok(());
            }

            let phase = tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => {
                    debug!("phase worker cancelled while waiting");
                    return Ok(());
                }
                next = self.queue.recv() => match next {
                    Some(phase) => phase,
                    None => return Ok(()),
                },
            };

            self.process(phase).await?;

            if phase.is_terminal() {
                return Ok(());
            }
        }
    }

    /// Handle one dequeued phase.
    async fn process(&mut self, phase: Phase) -> Result<(), RoundError> {
        let expected = self.expected_phase();
        let state = *self.shared.state.read();
        if phase != expected || state.phase != phase {
            return Err(RoundError::PhaseDesync {
                dequeued: phase,
                expected,
                recorded: state.phase,
            });
        }
        self.last_processed = Some(phase);

        info!(round = %state.round_id, %phase, "entering phase");

        // Policies hear about the phase before any outside observer does.
        let view = RoundView {
            state,
            registration_cap: self.shared.registration_cap,
        };
        let failures = self
            .shared
            .registry
            .lock()
            .await
            .notify_phase_changed(&view)
            .await;
        if self.shared.cancel.is_cancelled() {
            return Ok(());
        }
        self.shared.events.phase_changed(state);
        self.publish_failures(failures);

        match phase {
            Phase::InputRegistration => self.input_registration(view).await,
            Phase::ConnectionConfirmation => {
                if self.registered.is_empty() {
                    return Ok(());
                }
                self.coordinator
                    .confirm_connection(&state, &self.registered)
                    .await
                    .map_err(|e| coordinator_error(phase, e))
            }
            Phase::OutputRegistration => {
                if self.registered.is_empty() {
                    return Ok(());
                }
                let outputs = self
                    .shared
                    .registry
                    .lock()
                    .await
                    .plan_outputs(&self.ledger.snapshot());
                debug!(outputs = outputs.len(), "registering outputs");
                self.coordinator
                    .register_outputs(&state, &outputs)
                    .await
                    .map_err(|e| coordinator_error(phase, e))
            }
            Phase::TransactionSigning => {
                if self.registered.is_empty() {
                    return Ok(());
                }
                self.coordinator
                    .sign_transaction(&state, &self.registered)
                    .await
                    .map_err(|e| coordinator_error(phase, e))
            }
            Phase::Ended => Ok(()),
        }
    }

    async fn input_registration(&mut self, view: RoundView) -> Result<(), RoundError> {
        let state = view.state;
        self.shared.events.coin_selection_started(state);

        let failures = self
            .shared
            .registry
            .lock()
            .await
            .notify_coin_selection_started(view, &mut self.ledger)
            .await;
        if self.shared.cancel.is_cancelled() {
            debug!("coin selection interrupted by cancellation");
            return Ok(());
        }
        self.publish_failures(failures);

        let allocated = self.ledger.len();
        if allocated > view.registration_cap {
            return Err(RoundError::OverAllocation {
                allocated,
                cap: view.registration_cap,
            });
        }

        self.ledger.freeze();
        let allocation = self.ledger.snapshot();
        info!(
            round = %state.round_id,
            allocated,
            cap = view.registration_cap,
            unclaimed = self.ledger.unclaimed_count(),
            "coin selection finished"
        );
        self.shared.events.coin_selection_finished(allocation.clone());

        let coins = allocation.coins();
        let mut inputs = Vec::with_capacity(coins.len());
        for coin in &coins {
            let proof = self
                .proofs
                .ownership_proof(coin, &state)
                .await
                .map_err(|e| RoundError::OwnershipProof {
                    coin: coin.id,
                    reason: e.to_string(),
                })?;
            inputs.push(RegistrationInput {
                coin: coin.clone(),
                proof,
            });
        }

        let accepted = if inputs.is_empty() {
            Vec::new()
        } else {
            self.coordinator
                .register_inputs(&state, &inputs)
                .await
                .map_err(|e| coordinator_error(Phase::InputRegistration, e))?
        };

        let registered: Vec<Coin> = coins
            .into_iter()
            .filter(|coin| accepted.contains(&coin.id))
            .collect();
        if registered.len() < inputs.len() {
            warn!(
                offered = inputs.len(),
                accepted = registered.len(),
                "coordinator did not accept every input"
            );
        }

        self.registered = registered.iter().map(|coin| coin.id).collect();
        info!(round = %state.round_id, registered = registered.len(), "coin registration finished");
        self.shared.events.coin_registration_finished(registered);
        Ok(())
    }

    fn publish_failures(&self, failures: Vec<PolicyFailure>) {
        for failure in failures {
            self.shared
                .events
                .policy_failed(failure.id, failure.name, failure.error);
        }
    }
}

fn coordinator_error(phase: Phase, e: anyhow::Error) -> RoundError {
    RoundError::Coordinator {
        phase,
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coordinator::{NoProofs, NullCoordinator},
        events::RoundEvent,
        policy::PrivacyPolicy,
        round::RoundId,
    };

    fn shared(phase: Phase, cap: usize) -> Arc<RoundShared> {
        let cancel = CancellationToken::new();
        Arc::new(RoundShared {
            state: RwLock::new(RoundState::new(RoundId([8u8; 32]), phase)),
            registration_cap: cap,
            registry: Mutex::new(PolicyRegistry::with_cancellation(cancel.clone())),
            events: EventBroadcaster::new(16),
            cancel,
        })
    }

    fn worker(
        shared: &Arc<RoundShared>,
        rx: mpsc::Receiver<Phase>,
        coins: Vec<Coin>,
    ) -> PhaseWorker {
        PhaseWorker::new(
            shared.clone(),
            rx,
            AllocationLedger::new(coins),
            Arc::new(NullCoordinator),
            Arc::new(NoProofs),
        )
    }

    #[test]
    fn test_queue_drops_when_full() {
        let (submitter, _rx) = phase_queue();
        for phase in Phase::ALL {
            assert!(submitter.submit(phase));
        }
        assert!(!submitter.submit(Phase::Ended));
    }

    #[test]
    fn test_submit_after_worker_gone() {
        let (submitter, rx) = phase_queue();
        drop(rx);
        assert!(!submitter.submit(Phase::InputRegistration));
    }

    #[tokio::test]
    async fn test_desync_is_fatal() {
        let shared = shared(Phase::ConnectionConfirmation, 10);
        let (submitter, rx) = phase_queue();
        submitter.submit(Phase::InputRegistration);

        let result = worker(&shared, rx, Vec::new()).run().await;
        assert!(matches!(
            result,
            Err(RoundError::PhaseDesync {
                dequeued: Phase::InputRegistration,
                expected: Phase::InputRegistration,
                recorded: Phase::ConnectionConfirmation,
            })
        ));
    }

    #[tokio::test]
    async fn test_out_of_order_phase_is_desync() {
        let shared = shared(Phase::InputRegistration, 10);
        let (submitter, rx) = phase_queue();
        let worker = worker(&shared, rx, Vec::new());
        let mut events = shared.events.subscribe();

        // The recorded phase agrees with the queue, but input registration
        // was never handled.
        *shared.state.write() = RoundState::new(RoundId([8u8; 32]), Phase::OutputRegistration);
        submitter.submit(Phase::OutputRegistration);

        let result = worker.run().await;
        assert!(matches!(
            result,
            Err(RoundError::PhaseDesync {
                dequeued: Phase::OutputRegistration,
                expected: Phase::InputRegistration,
                recorded: Phase::OutputRegistration,
            })
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_phases_in_order_are_accepted() {
        let shared = shared(Phase::InputRegistration, 10);
        let (_submitter, rx) = phase_queue();
        let mut worker = worker(&shared, rx, Vec::new());

        for phase in Phase::ALL {
            assert_eq!(worker.expected_phase(), phase);
            *shared.state.write() = RoundState::new(RoundId([8u8; 32]), phase);
            worker.process(phase).await.unwrap();
        }
        assert_eq!(worker.last_processed, Some(Phase::Ended));
    }

    #[tokio::test]
    async fn test_cancelled_worker_exits_without_processing() {
        let shared = shared(Phase::InputRegistration, 10);
        let mut events = shared.events.subscribe();
        let (submitter, rx) = phase_queue();
        submitter.submit(Phase::InputRegistration);
        shared.cancel.cancel();

        worker(&shared, rx, Vec::new()).run().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ended_stops_worker() {
        let shared = shared(Phase::Ended, 10);
        let (submitter, rx) = phase_queue();
        submitter.submit(Phase::Ended);

        worker(&shared, rx, Vec::new()).run().await.unwrap();
        assert!(!submitter.submit(Phase::Ended));
    }

    #[tokio::test]
    async fn test_input_registration_event_order() {
        let shared = shared(Phase::InputRegistration, 20);
        shared
            .registry
            .lock()
            .await
            .attach(Box::new(PrivacyPolicy::new()));
        let mut events = shared.events.subscribe();

        let coins: Vec<Coin> = (0..25u8)
            .map(|i| Coin::new(CoinId::new([i; 32], 0), 1_000, 0.0))
            .collect();
        let (submitter, rx) = phase_queue();
        submitter.submit(Phase::InputRegistration);
        drop(submitter);

        worker(&shared, rx, coins).run().await.unwrap();

        assert!(matches!(events.try_recv(), Ok(RoundEvent::PhaseChanged { .. })));
        assert!(matches!(
            events.try_recv(),
            Ok(RoundEvent::CoinSelectionStarted { .. })
        ));
        match events.try_recv() {
            Ok(RoundEvent::CoinSelectionFinished { allocation }) => {
                assert_eq!(allocation.len(), 20)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match events.try_recv() {
            Ok(RoundEvent::CoinRegistrationFinished { coins }) => assert_eq!(coins.len(), 20),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(events.try_recv().is_err());
    }
}
