// Copyright (c) 2024 Botho Foundation

//! Allocation ledger: which policy committed which coin this round.
//!
//! The ledger is the single source of truth for coin ownership during a
//! round. It enforces two structural invariants on every claim:
//!
//! 1. Every claimed coin is drawn from the round's available set.
//! 2. No coin is owned by more than one policy.
//!
//! The per-round registration cap is a round constraint, not a ledger one:
//! selection algorithms respect it through
//! [`SelectionContext`](crate::policy::SelectionContext) and the phase
//! worker verifies it once selection is over.
//!
//! The ledger is only written during coin selection. Once the worker freezes
//! it, every claim is rejected with [`LedgerError::Frozen`].

use std::collections::HashMap;

use crate::{
    coin::{Coin, CoinId},
    error::LedgerError,
    policy::PolicyId,
};

/// Mapping from claimed coin to owning policy.
#[derive(Debug, Clone)]
pub struct AllocationLedger {
    /// Available coins in the wallet's natural order.
    available: Vec<Coin>,

    /// Ids of the available coins.
    known: HashMap<CoinId, usize>,

    /// Owner of every claimed coin.
    owners: HashMap<CoinId, PolicyId>,

    /// Claimed coin ids in the order they were claimed.
    claim_order: Vec<CoinId>,

    frozen: bool,
}

impl AllocationLedger {
    /// Create an empty ledger over the given pool.
    ///
    /// Duplicate coin ids are collapsed; the first occurrence keeps its
    /// position in the pool.
    pub fn new(coins: Vec<Coin>) -> Self {
        let mut available = Vec::with_capacity(coins.len());
        let mut known = HashMap::with_capacity(coins.len());

        for coin in coins {
            if known.contains_key(&coin.id) {
                continue;
            }
            known.insert(coin.id, available.len());
            available.push(coin);
        }

        Self {
            available,
            known,
            owners: HashMap::new(),
            claim_order: Vec::new(),
            frozen: false,
        }
    }

    /// All coins of the round, claimed or not, in pool order.
    pub fn available(&self) -> &[Coin] {
        &self.available
    }

    /// Coins nobody has claimed yet, in pool order.
    pub fn unclaimed(&self) -> impl Iterator<Item = &Coin> + '_ {
        self.available
            .iter()
            .filter(move |coin| !self.owners.contains_key(&coin.id))
    }

    pub fn unclaimed_count(&self) -> usize {
        self.available.len() - self.owners.len()
    }

    /// Record `policy` as the owner of `coin`.
    pub fn claim(&mut self, coin: CoinId, policy: PolicyId) -> Result<(), LedgerError> {
        if self.frozen {
            return Err(LedgerError::Frozen);
        }
        if !self.known.contains_key(&coin) {
            return Err(LedgerError::UnknownCoin(coin));
        }
        if let Some(owner) = self.owners.get(&coin) {
            return Err(LedgerError::AlreadyClaimed {
                coin,
                owner: *owner,
            });
        }

        self.owners.insert(coin, policy);
        self.claim_order.push(coin);
        Ok(())
    }

    pub fn owner_of(&self, coin: &CoinId) -> Option<PolicyId> {
        self.owners.get(coin).copied()
    }

    /// Number of claimed coins.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Coins owned by `policy`, in claim order.
    pub fn claimed_by(&self, policy: PolicyId) -> Vec<Coin> {
        self.claim_order
            .iter()
            .filter(|id| self.owners.get(id) == Some(&policy))
            .filter_map(|id| self.coin(id))
            .cloned()
            .collect()
    }

    /// Stop accepting claims.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Point-in-time copy of the allocation, in claim order.
    pub fn snapshot(&self) -> Allocation {
        let entries = self
            .claim_order
            .iter()
            .filter_map(|id| {
                let coin = self.coin(id)?;
                let policy = self.owners.get(id)?;
                Some(AllocationEntry {
                    coin: coin.clone(),
                    policy: *policy,
                })
            })
            .collect();

        Allocation { entries }
    }

    fn coin(&self, id: &CoinId) -> Option<&Coin> {
        self.known.get(id).map(|&idx| &self.available[idx])
    }
}

/// One claimed coin and its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationEntry {
    pub coin: Coin,
    pub policy: PolicyId,
}

/// Final allocation published when coin selection finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    entries: Vec<AllocationEntry>,
}

impl Allocation {
    pub fn entries(&self) -> &[AllocationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every allocated coin, in claim order.
    pub fn coins(&self) -> Vec<Coin> {
        self.entries.iter().map(|e| e.coin.clone()).collect()
    }

    /// Coins allocated to one policy, in claim order.
    pub fn coins_of(&self, policy: PolicyId) -> Vec<Coin> {
        self.entries
            .iter()
            .filter(|e| e.policy == policy)
            .map(|e| e.coin.clone())
            .collect()
    }

    pub fn owner_of(&self, coin: &CoinId) -> Option<PolicyId> {
        self.entries
            .iter()
            .find(|e| &e.coin.id == coin)
            .map(|e| e.policy)
    }
}
