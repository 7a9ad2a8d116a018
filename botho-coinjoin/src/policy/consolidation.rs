// Copyright (c) 2024 Botho Foundation

//! Consolidation: merge many small coins into one output.
//!
//! Coin claiming follows the privacy rule. The difference shows up at
//! output registration, where every claimed coin feeds a single output.

use async_trait::async_trait;
use tracing::debug;

use super::{OutputKind, PlannedOutput, Policy, SelectionContext};
use crate::{
    coin::{total_amount, Coin},
    error::PolicyError,
    selection::claim_greedy,
};

#[derive(Debug, Default)]
pub struct ConsolidationPolicy;

impl ConsolidationPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Policy for ConsolidationPolicy {
    fn name(&self) -> &'static str {
        "consolidation"
    }

    async fn on_coin_selection_started(
        &mut self,
        ctx: &mut SelectionContext<'_>,
    ) -> Result<(), PolicyError> {
        let claimed = claim_greedy(ctx)?;

        if claimed.is_empty() {
            return Err(PolicyError::SelectionFailure(
                "nothing left to consolidate".to_string(),
            ));
        }

        debug!(
            policy = %ctx.policy(),
            coins = claimed.len(),
            value = total_amount(&claimed),
            "consolidation policy claimed coins"
        );
        Ok(())
    }

    fn plan_outputs(&self, claimed: &[Coin]) -> Vec<PlannedOutput> {
        if claimed.is_empty() {
            return Vec::new();
        }
        vec![PlannedOutput::to_wallet(
            total_amount(claimed),
            OutputKind::Consolidated,
        )]
    }
}
