// Copyright (c) 2024 Botho Foundation
//
//! Fake collaborators and recording policies.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use botho_coinjoin::{
    Coin, CoinId, Coordinator, OwnershipProof, OwnershipProofProvider, Phase, PlannedOutput,
    Policy, PolicyError, RegistrationInput, RoundState, RoundView, SelectionContext,
};
use parking_lot::Mutex;

/// A call the phase worker made against the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorCall {
    RegisterInputs(Vec<CoinId>),
    ConfirmConnection(Vec<CoinId>),
    RegisterOutputs(Vec<PlannedOutput>),
    SignTransaction(Vec<CoinId>),
}

/// Coordinator that records every call and accepts everything unless told
/// otherwise.
#[derive(Default)]
pub struct FakeCoordinator {
    pub(crate) calls: Mutex<Vec<CoordinatorCall>>,

    /// Fail the action of this phase.
    pub fail_phase: Option<Phase>,

    /// Accept at most this many inputs.
    pub accept_limit: Option<usize>,
}

impl FakeCoordinator {
    pub fn failing_in(phase: Phase) -> Self {
        Self {
            fail_phase: Some(phase),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<CoordinatorCall> {
        self.calls.lock().clone()
    }

    fn check(&self, phase: Phase) -> anyhow::Result<()> {
        if self.fail_phase == Some(phase) {
            anyhow::bail!("coordinator unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn register_inputs(
        &self,
        _round: &RoundState,
        inputs: &[RegistrationInput],
    ) -> anyhow::Result<Vec<CoinId>> {
        let ids: Vec<CoinId> = inputs.iter().map(|input| input.coin.id).collect();
        self.calls
            .lock()
            .push(CoordinatorCall::RegisterInputs(ids.clone()));
        self.check(Phase::InputRegistration)?;

        let limit = self.accept_limit.unwrap_or(ids.len());
        Ok(ids.into_iter().take(limit).collect())
    }

    async fn confirm_connection(
        &self,
        _round: &RoundState,
        coins: &[CoinId],
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push(CoordinatorCall::ConfirmConnection(coins.to_vec()));
        self.check(Phase::ConnectionConfirmation)
    }

    async fn register_outputs(
        &self,
        _round: &RoundState,
        outputs: &[PlannedOutput],
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push(CoordinatorCall::RegisterOutputs(outputs.to_vec()));
        self.check(Phase::OutputRegistration)
    }

    async fn sign_transaction(&self, _round: &RoundState, coins: &[CoinId]) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push(CoordinatorCall::SignTransaction(coins.to_vec()));
        self.check(Phase::TransactionSigning)
    }
}

/// Wallet that cannot prove ownership of anything.
pub struct FailingProofs;

#[async_trait]
impl OwnershipProofProvider for FailingProofs {
    async fn ownership_proof(
        &self,
        _coin: &Coin,
        _round: &RoundState,
    ) -> anyhow::Result<OwnershipProof> {
        anyhow::bail!("wallet locked")
    }
}

/// What a recording policy has observed.
#[derive(Default)]
pub struct CallLog {
    pub phases: Mutex<Vec<Phase>>,
    pub selections: AtomicUsize,
    pub detached: AtomicUsize,
}

impl CallLog {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().clone()
    }

    pub fn selections(&self) -> usize {
        self.selections.load(Ordering::SeqCst)
    }

    pub fn detached(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

/// Policy that claims nothing and records every notification.
pub struct RecordingPolicy {
    log: Arc<CallLog>,
    fail_selection: bool,
}

impl RecordingPolicy {
    pub fn new() -> (Box<dyn Policy>, Arc<CallLog>) {
        Self::build(false)
    }

    /// A recorder that fails as soon as coin selection starts.
    pub fn failing() -> (Box<dyn Policy>, Arc<CallLog>) {
        Self::build(true)
    }

    fn build(fail_selection: bool) -> (Box<dyn Policy>, Arc<CallLog>) {
        let log = Arc::new(CallLog::default());
        let policy = Box::new(Self {
            log: log.clone(),
            fail_selection,
        });
        (policy, log)
    }
}

#[async_trait]
impl Policy for RecordingPolicy {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn on_phase_changed(&mut self, round: &RoundView) -> Result<(), PolicyError> {
        self.log.phases.lock().push(round.state.phase);
        Ok(())
    }

    async fn on_coin_selection_started(
        &mut self,
        _ctx: &mut SelectionContext<'_>,
    ) -> Result<(), PolicyError> {
        self.log.selections.fetch_add(1, Ordering::SeqCst);
        if self.fail_selection {
            return Err(PolicyError::SelectionFailure("refused".to_string()));
        }
        Ok(())
    }

    fn on_detached(&mut self) {
        self.log.detached.fetch_add(1, Ordering::SeqCst);
    }
}

/// Policy whose coin selection never finishes, like one waiting on a payee
/// that went silent.
pub struct StalledPolicy {
    log: Arc<CallLog>,
}

impl StalledPolicy {
    pub fn new() -> (Box<dyn Policy>, Arc<CallLog>) {
        let log = Arc::new(CallLog::default());
        (Box::new(Self { log: log.clone() }), log)
    }
}

#[async_trait]
impl Policy for StalledPolicy {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn on_coin_selection_started(
        &mut self,
        _ctx: &mut SelectionContext<'_>,
    ) -> Result<(), PolicyError> {
        self.log.selections.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }

    fn on_detached(&mut self) {
        self.log.detached.fetch_add(1, Ordering::SeqCst);
    }
}

/// Policy that claims every unclaimed coin, ignoring the registration cap.
pub struct RoguePolicy;

#[async_trait]
impl Policy for RoguePolicy {
    fn name(&self) -> &'static str {
        "rogue"
    }

    async fn on_coin_selection_started(
        &mut self,
        ctx: &mut SelectionContext<'_>,
    ) -> Result<(), PolicyError> {
        for coin in ctx.unclaimed() {
            ctx.claim(&coin)?;
        }
        Ok(())
    }
}
