// Copyright (c) 2024 Botho Foundation

//! Payment batching: pay third parties out of coins the wallet mixes anyway.
//!
//! A request that the pool cannot cover this round is not an error on its
//! own. It stays in the [`PaymentBook`] and is reported through
//! [`Policy::pending_payments`] so the wallet can carry it into the next
//! round. The policy only fails when it funds nothing at all.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{OutputKind, PlannedOutput, Policy, SelectionContext};
use crate::{
    coin::{total_amount, Coin, PaymentRequest},
    error::PolicyError,
    selection::{fund_payments, FundedPayment, PaymentFunding},
};

/// Payment requests and which of them are already funded.
#[derive(Debug, Clone, Default)]
pub struct PaymentBook {
    requests: Vec<PaymentRequest>,
    handled: Vec<bool>,
    funded: Vec<FundedPayment>,
}

impl PaymentBook {
    pub fn new(requests: Vec<PaymentRequest>) -> Self {
        let handled = vec![false; requests.len()];
        Self {
            requests,
            handled,
            funded: Vec::new(),
        }
    }

    pub fn requests(&self) -> &[PaymentRequest] {
        &self.requests
    }

    pub fn is_handled(&self, index: usize) -> bool {
        self.handled.get(index).copied().unwrap_or(false)
    }

    pub fn handled_count(&self) -> usize {
        self.handled.iter().filter(|h| **h).count()
    }

    /// Requests not funded yet, in their original order.
    pub fn pending(&self) -> Vec<PaymentRequest> {
        self.requests
            .iter()
            .zip(&self.handled)
            .filter(|(_, handled)| !**handled)
            .map(|(request, _)| request.clone())
            .collect()
    }

    /// Payments funded so far, in funding order.
    pub fn funded(&self) -> &[FundedPayment] {
        &self.funded
    }

    /// Mark one funded payment as handled.
    pub fn settle(&mut self, payment: FundedPayment) {
        if let Some(flag) = self.handled.get_mut(payment.request_index) {
            *flag = true;
        }
        self.funded.push(payment);
    }

    /// Mark every payment of a funding pass as handled.
    pub fn record(&mut self, funding: PaymentFunding) {
        for payment in funding.funded {
            self.settle(payment);
        }
    }

    /// Outputs for the claimed coins: optionally one per funded payment,
    /// then a single change output for whatever the payments do not use.
    pub fn plan(&self, claimed: &[Coin], with_payments: bool) -> Vec<PlannedOutput> {
        let paid: u64 = self
            .funded
            .iter()
            .filter_map(|p| self.requests.get(p.request_index))
            .map(|r| r.amount)
            .fold(0u64, u64::saturating_add);

        let mut outputs = Vec::with_capacity(self.funded.len() + 1);
        if with_payments {
            outputs.extend(
                self.funded
                    .iter()
                    .filter_map(|p| self.requests.get(p.request_index))
                    .map(PlannedOutput::payment),
            );
        }

        let change = total_amount(claimed).saturating_sub(paid);
        if change > 0 {
            outputs.push(PlannedOutput::to_wallet(change, OutputKind::Change));
        }
        outputs
    }
}

/// Funds payment requests from coins it claims in the round.
#[derive(Debug)]
pub struct PaymentBatchingPolicy {
    book: PaymentBook,
}

impl PaymentBatchingPolicy {
    pub fn new(requests: Vec<PaymentRequest>) -> Self {
        Self {
            book: PaymentBook::new(requests),
        }
    }

    pub fn book(&self) -> &PaymentBook {
        &self.book
    }
}

#[async_trait]
impl Policy for PaymentBatchingPolicy {
    fn name(&self) -> &'static str {
        "payment-batching"
    }

    async fn on_coin_selection_started(
        &mut self,
        ctx: &mut SelectionContext<'_>,
    ) -> Result<(), PolicyError> {
        let book = &self.book;
        let funding = fund_payments(ctx, book.requests(), |i, _| book.is_handled(i))?;

        if funding.is_total_failure() {
            return Err(PolicyError::SelectionFailure(format!(
                "none of {} payment requests could be funded",
                funding.unfunded.len()
            )));
        }

        if !funding.unfunded.is_empty() {
            info!(
                policy = %ctx.policy(),
                funded = funding.funded_count(),
                unfunded = funding.unfunded.len(),
                "payment requests left for a later round"
            );
        } else {
            debug!(
                policy = %ctx.policy(),
                funded = funding.funded_count(),
                "all payment requests funded"
            );
        }

        self.book.record(funding);
        Ok(())
    }

    fn plan_outputs(&self, claimed: &[Coin]) -> Vec<PlannedOutput> {
        self.book.plan(claimed, true)
    }

    fn pending_payments(&self) -> Vec<PaymentRequest> {
        self.book.pending()
    }
}
