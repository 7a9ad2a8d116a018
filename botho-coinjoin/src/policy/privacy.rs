// Copyright (c) 2024 Botho Foundation

//! Privacy maximization: commit as many coins as the round allows.

use async_trait::async_trait;
use tracing::debug;

use super::{Policy, SelectionContext};
use crate::{error::PolicyError, selection::claim_greedy};

/// Claims unclaimed coins in pool order up to the registration cap and
/// remixes each of them into its own output.
#[derive(Debug, Default)]
pub struct PrivacyPolicy {
    rounds_joined: usize,
}

impl PrivacyPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rounds in which this policy committed at least one coin.
    pub fn rounds_joined(&self) -> usize {
        self.rounds_joined
    }
}

#[async_trait]
impl Policy for PrivacyPolicy {
    fn name(&self) -> &'static str {
        "privacy"
    }

    async fn on_coin_selection_started(
        &mut self,
        ctx: &mut SelectionContext<'_>,
    ) -> Result<(), PolicyError> {
        let claimed = claim_greedy(ctx)?;

        if claimed.is_empty() {
            return Err(PolicyError::SelectionFailure(
                "no unclaimed coins within the registration cap".to_string(),
            ));
        }

        self.rounds_joined += 1;
        debug!(policy = %ctx.policy(), coins = claimed.len(), "privacy policy claimed coins");
        Ok(())
    }
}
