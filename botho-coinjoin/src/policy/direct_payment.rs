// Copyright (c) 2024 Botho Foundation

//! Direct settlement: payments the payee collects itself.
//!
//! Funding works like payment batching, restricted to requests whose payee
//! publishes an endpoint. Once a request is funded the policy hands the
//! payee its credentials through a [`CredentialExchange`]; the payee then
//! registers its own output, so this policy plans change outputs only.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{PaymentBook, PlannedOutput, Policy, SelectionContext};
use crate::{
    coin::{Coin, PaymentRequest},
    coordinator::CredentialExchange,
    error::PolicyError,
    selection::fund_payments,
};

pub struct DirectPaymentPolicy {
    book: PaymentBook,
    exchange: Arc<dyn CredentialExchange>,
}

impl DirectPaymentPolicy {
    pub fn new(requests: Vec<PaymentRequest>, exchange: Arc<dyn CredentialExchange>) -> Self {
        Self {
            book: PaymentBook::new(requests),
            exchange,
        }
    }

    pub fn book(&self) -> &PaymentBook {
        &self.book
    }
}

#[async_trait]
impl Policy for DirectPaymentPolicy {
    fn name(&self) -> &'static str {
        "direct-payment"
    }

    async fn on_coin_selection_started(
        &mut self,
        ctx: &mut SelectionContext<'_>,
    ) -> Result<(), PolicyError> {
        let book = &self.book;
        let funding = fund_payments(ctx, book.requests(), |i, request| {
            book.is_handled(i) || request.endpoint.is_none()
        })?;

        if funding.is_total_failure() {
            return Err(PolicyError::SelectionFailure(
                "no direct payment could be funded".to_string(),
            ));
        }

        for payment in funding.funded {
            let request = self.book.requests()[payment.request_index].clone();
            if let Err(e) = self.exchange.settle(&request, &payment.coins).await {
                warn!(
                    policy = %ctx.policy(),
                    destination = %request.destination,
                    "credential exchange failed: {}",
                    e
                );
                return Err(PolicyError::CredentialExchange(e.to_string()));
            }
            debug!(
                policy = %ctx.policy(),
                destination = %request.destination,
                "direct payment settled"
            );
            self.book.settle(payment);
        }

        Ok(())
    }

    fn plan_outputs(&self, claimed: &[Coin]) -> Vec<PlannedOutput> {
        self.book.plan(claimed, false)
    }

    fn pending_payments(&self) -> Vec<PaymentRequest> {
        self.book.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coin::CoinId,
        ledger::AllocationLedger,
        policy::{OutputKind, PolicyId, RoundView},
        round::{Phase, RoundId, RoundState},
    };
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingExchange {
        settled: Mutex<Vec<String>>,
        refuse: bool,
    }

    #[async_trait]
    impl CredentialExchange for RecordingExchange {
        async fn settle(&self, request: &PaymentRequest, _coins: &[Coin]) -> anyhow::Result<()> {
            if self.refuse {
                anyhow::bail!("payee offline");
            }
            self.settled.lock().push(request.destination.clone());
            Ok(())
        }
    }

    fn view() -> RoundView {
        RoundView {
            state: RoundState::new(RoundId([6u8; 32]), Phase::InputRegistration),
            registration_cap: 10,
        }
    }

    fn pool(amounts: &[u64]) -> Vec<Coin> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, &amount)| Coin::new(CoinId::new([i as u8; 32], 0), amount, 0.0))
            .collect()
    }

    #[tokio::test]
    async fn test_only_requests_with_endpoint_are_funded() {
        let exchange = Arc::new(RecordingExchange::default());
        let mut policy = DirectPaymentPolicy::new(
            vec![
                PaymentRequest::new(3, "bth1plain"),
                PaymentRequest::new(3, "bth1direct").with_endpoint("payee.example:7100"),
            ],
            exchange.clone(),
        );
        let mut ledger = AllocationLedger::new(pool(&[4, 4]));

        let mut ctx = SelectionContext::new(PolicyId(0), view(), &mut ledger);
        policy.on_coin_selection_started(&mut ctx).await.unwrap();

        assert_eq!(*exchange.settled.lock(), vec!["bth1direct".to_string()]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(policy.pending_payments(), vec![PaymentRequest::new(3, "bth1plain")]);

        let outputs = policy.plan_outputs(&ledger.claimed_by(PolicyId(0)));
        assert_eq!(outputs, vec![PlannedOutput::to_wallet(1, OutputKind::Change)]);
    }

    #[tokio::test]
    async fn test_refused_exchange_fails_policy() {
        let exchange = Arc::new(RecordingExchange {
            refuse: true,
            ..Default::default()
        });
        let mut policy = DirectPaymentPolicy::new(
            vec![PaymentRequest::new(2, "bth1direct").with_endpoint("payee.example:7100")],
            exchange,
        );
        let mut ledger = AllocationLedger::new(pool(&[5]));

        let mut ctx = SelectionContext::new(PolicyId(0), view(), &mut ledger);
        let result = policy.on_coin_selection_started(&mut ctx).await;

        assert!(matches!(result, Err(PolicyError::CredentialExchange(_))));
        // Claims made before the exchange are not rolled back.
        assert_eq!(ledger.len(), 1);
        assert_eq!(policy.pending_payments().len(), 1);
    }

    #[tokio::test]
    async fn test_no_endpoint_means_failure() {
        let exchange = Arc::new(RecordingExchange::default());
        let mut policy =
            DirectPaymentPolicy::new(vec![PaymentRequest::new(1, "bth1plain")], exchange);
        let mut ledger = AllocationLedger::new(pool(&[5]));

        let mut ctx = SelectionContext::new(PolicyId(0), view(), &mut ledger);
        let result = policy.on_coin_selection_started(&mut ctx).await;

        assert!(matches!(result, Err(PolicyError::SelectionFailure(_))));
        assert!(ledger.is_empty());
    }
}
