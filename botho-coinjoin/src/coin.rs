// Copyright (c) 2024 Botho Foundation

//! Coins and payment requests observed by a round participant.
//!
//! Both types are passive values: a [`Coin`] is supplied by the wallet once
//! when the round client is built and never changes afterwards, and a
//! [`PaymentRequest`] is handed to a payment policy at construction.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// Identifier of an unspent output: the creating transaction and the output
/// index inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoinId {
    pub tx_hash: [u8; 32],
    pub output_index: u32,
}

impl CoinId {
    pub fn new(tx_hash: [u8; 32], output_index: u32) -> Self {
        Self {
            tx_hash,
            output_index,
        }
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight bytes of the hash are plenty to tell coins apart in logs
        write!(f, "{}:{}", hex::encode(&self.tx_hash[..8]), self.output_index)
    }
}

/// A wallet coin available for mixing.
///
/// Equality and hashing look at [`CoinId`] only. Two `Coin` values with the
/// same id are the same coin even if a stale copy carries a different score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coin {
    /// Unique identifier of the output.
    pub id: CoinId,

    /// Amount in picocredits.
    pub amount: u64,

    /// Privacy score assigned by the wallet (higher is more private).
    pub anonymity_score: f64,
}

impl Coin {
    pub fn new(id: CoinId, amount: u64, anonymity_score: f64) -> Self {
        Self {
            id,
            amount,
            anonymity_score,
        }
    }
}

impl PartialEq for Coin {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Coin {}

impl Hash for Coin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Sum the amounts of a set of coins, saturating on overflow.
pub fn total_amount<'a>(coins: impl IntoIterator<Item = &'a Coin>) -> u64 {
    coins
        .into_iter()
        .fold(0u64, |acc, coin| acc.saturating_add(coin.amount))
}

/// A payment the wallet wants to settle through a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount owed in picocredits.
    pub amount: u64,

    /// Destination address of the payee.
    pub destination: String,

    /// Endpoint of the payee for direct settlement, if it supports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount: u64, destination: impl Into<String>) -> Self {
        Self {
            amount,
            destination: destination.into(),
            endpoint: None,
        }
    }

    /// Attach a direct-settlement endpoint to this request.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}
