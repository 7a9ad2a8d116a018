// Copyright (c) 2024 Botho Foundation
//
//! Coin and round factories.

use botho_coinjoin::{Coin, CoinId, Phase, RoundId, RoundState};

/// Id of the round every test takes part in.
pub const TEST_ROUND: RoundId = RoundId([0x42; 32]);

/// Deterministic coin id for the `index`-th test coin.
pub fn coin_id(index: usize) -> CoinId {
    let mut tx_hash = [0u8; 32];
    tx_hash[..8].copy_from_slice(&(index as u64).to_le_bytes());
    CoinId::new(tx_hash, index as u32)
}

/// Coins with the given amounts, in pool order.
pub fn coins(amounts: &[u64]) -> Vec<Coin> {
    amounts
        .iter()
        .enumerate()
        .map(|(i, &amount)| Coin::new(coin_id(i), amount, 1.0))
        .collect()
}

/// `n` coins of the same amount.
pub fn uniform_coins(n: usize, amount: u64) -> Vec<Coin> {
    coins(&vec![amount; n])
}

/// Snapshot of the test round in `phase`.
pub fn round(phase: Phase) -> RoundState {
    RoundState::new(TEST_ROUND, phase)
}
