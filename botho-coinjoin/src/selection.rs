// Copyright (c) 2024 Botho Foundation

//! Coin selection algorithms shared by the built-in policies.
//!
//! Both algorithms walk the unclaimed pool in its natural order, so the
//! outcome for a given pool, cap and attachment order is deterministic.
//!
//! # Greedy claim
//!
//! Claim unclaimed coins one by one until the pool is exhausted or the
//! round's registration cap is reached. Used by the privacy and
//! consolidation policies.
//!
//! # Payment funding
//!
//! Requests are processed in the order given. For each one, unclaimed coins
//! are claimed one at a time until their value covers the amount. When the
//! pool or the cap runs out first, the request stays unfunded but keeps the
//! coins claimed for it; their value ends up in the policy's change output.

use tracing::trace;

use crate::{
    coin::{total_amount, Coin, PaymentRequest},
    error::LedgerError,
    policy::SelectionContext,
};

/// Claim unclaimed coins in pool order until the pool or the cap runs out.
///
/// Returns the coins claimed by this call.
pub fn claim_greedy(ctx: &mut SelectionContext<'_>) -> Result<Vec<Coin>, LedgerError> {
    let budget = ctx.remaining_capacity();
    let candidates: Vec<Coin> = ctx.unclaimed().into_iter().take(budget).collect();

    for coin in &candidates {
        ctx.claim(coin)?;
    }

    trace!(
        policy = %ctx.policy(),
        claimed = candidates.len(),
        budget,
        "greedy claim"
    );
    Ok(candidates)
}

/// A payment request together with the coins that fund it.
#[derive(Debug, Clone, PartialEq)]
pub struct FundedPayment {
    /// Position of the request in the slice passed to [`fund_payments`].
    pub request_index: usize,

    pub coins: Vec<Coin>,

    /// Value of `coins` above the requested amount.
    pub change: u64,
}

/// Outcome of one funding pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentFunding {
    pub funded: Vec<FundedPayment>,

    /// Indices of requests that could not be covered.
    pub unfunded: Vec<usize>,
}

impl PaymentFunding {
    pub fn funded_count(&self) -> usize {
        self.funded.len()
    }

    /// Nothing was funded although something was asked for.
    pub fn is_total_failure(&self) -> bool {
        self.funded.is_empty()
    }
}

/// Fund payment requests from unclaimed coins.
///
/// `skip` marks requests that must not be funded in this pass (already
/// funded, or not eligible for the calling policy). Skipped requests are
/// reported neither as funded nor as unfunded.
///
/// Coins claimed for a request that could not be covered stay claimed.
pub fn fund_payments(
    ctx: &mut SelectionContext<'_>,
    requests: &[PaymentRequest],
    skip: impl Fn(usize, &PaymentRequest) -> bool,
) -> Result<PaymentFunding, LedgerError> {
    let mut funding = PaymentFunding::default();

    for (index, request) in requests.iter().enumerate() {
        if skip(index, request) {
            continue;
        }

        let coins = claim_covering(ctx, request.amount)?;
        let accumulated = total_amount(&coins);

        if accumulated >= request.amount && !coins.is_empty() {
            let change = accumulated - request.amount;
            trace!(
                policy = %ctx.policy(),
                request = index,
                coins = coins.len(),
                change,
                "payment funded"
            );
            funding.funded.push(FundedPayment {
                request_index: index,
                coins,
                change,
            });
        } else {
            trace!(
                policy = %ctx.policy(),
                request = index,
                claimed = coins.len(),
                short = request.amount.saturating_sub(accumulated),
                "payment not coverable"
            );
            funding.unfunded.push(index);
        }
    }

    Ok(funding)
}

/// Claim coins in pool order until `amount` is covered by at least one coin,
/// or until the pool or the cap runs out.
fn claim_covering(ctx: &mut SelectionContext<'_>, amount: u64) -> Result<Vec<Coin>, LedgerError> {
    let mut claimed = Vec::new();
    let mut accumulated = 0u64;

    for coin in ctx.unclaimed() {
        if accumulated >= amount && !claimed.is_empty() {
            break;
        }
        if ctx.remaining_capacity() == 0 {
            break;
        }
        ctx.claim(&coin)?;
        accumulated = accumulated.saturating_add(coin.amount);
        claimed.push(coin);
    }

    Ok(claimed)
}
