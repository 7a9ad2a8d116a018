// Copyright (c) 2024 Botho Foundation

//! Collaborators the round client talks to.
//!
//! - [`Coordinator`]: the round coordinator's protocol surface
//! - [`OwnershipProofProvider`]: the wallet, proving control of coins
//! - [`CredentialExchange`]: a payee settling a payment directly
//!
//! All of them report failure as `anyhow::Error`; the phase worker wraps
//! those into [`RoundError`](crate::RoundError) or
//! [`PolicyError`](crate::PolicyError) as appropriate.

use async_trait::async_trait;

use crate::{
    coin::{Coin, CoinId, PaymentRequest},
    policy::PlannedOutput,
    round::RoundState,
};

/// Opaque proof that the wallet controls a coin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipProof(pub Vec<u8>);

impl OwnershipProof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// A coin ready to be registered, together with its ownership proof.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationInput {
    pub coin: Coin,
    pub proof: OwnershipProof,
}

/// Protocol actions the phase worker performs against the coordinator.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Register inputs for the round.
    ///
    /// Returns the ids of the coins the coordinator accepted.
    async fn register_inputs(
        &self,
        round: &RoundState,
        inputs: &[RegistrationInput],
    ) -> anyhow::Result<Vec<CoinId>>;

    /// Keep registered inputs alive while the round fills up.
    async fn confirm_connection(
        &self,
        _round: &RoundState,
        _coins: &[CoinId],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Register the outputs planned by the policies.
    async fn register_outputs(
        &self,
        _round: &RoundState,
        _outputs: &[PlannedOutput],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Sign the round transaction for the registered inputs.
    async fn sign_transaction(&self, _round: &RoundState, _coins: &[CoinId]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Produces ownership proofs for coins about to be registered.
#[async_trait]
pub trait OwnershipProofProvider: Send + Sync {
    async fn ownership_proof(&self, coin: &Coin, round: &RoundState)
        -> anyhow::Result<OwnershipProof>;
}

/// Direct settlement with a payee that supports it.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// Hand the payee the credentials for `request`, backed by `coins`.
    async fn settle(&self, request: &PaymentRequest, coins: &[Coin]) -> anyhow::Result<()>;
}

/// Coordinator that accepts every input and ignores every other action.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCoordinator;

#[async_trait]
impl Coordinator for NullCoordinator {
    async fn register_inputs(
        &self,
        _round: &RoundState,
        inputs: &[RegistrationInput],
    ) -> anyhow::Result<Vec<CoinId>> {
        Ok(inputs.iter().map(|input| input.coin.id).collect())
    }
}

/// Proof provider that returns an empty proof for every coin.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProofs;

#[async_trait]
impl OwnershipProofProvider for NoProofs {
    async fn ownership_proof(
        &self,
        _coin: &Coin,
        _round: &RoundState,
    ) -> anyhow::Result<OwnershipProof> {
        Ok(OwnershipProof(Vec::new()))
    }
}
