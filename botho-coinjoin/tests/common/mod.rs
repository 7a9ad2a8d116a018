// Copyright (c) 2024 Botho Foundation
//
//! Common test utilities for round integration tests.
//!
//! Provides coin factories, a recording coordinator, recording policies and
//! helpers for waiting on round events, so each test only has to describe
//! its scenario.
//!
//! # Example
//!
//! ```ignore
//! use common::{uniform_coins, round, FakeCoordinator, next_event};
//!
//! let coordinator = Arc::new(FakeCoordinator::default());
//! let client = RoundClient::builder(round(Phase::InputRegistration), coordinator.clone())
//!     .coins(uniform_coins(25, 1_000))
//!     .build()?;
//! ```

#![allow(dead_code)]

mod coins;
mod fakes;

pub use coins::*;
pub use fakes::*;

use std::time::Duration;

use botho_coinjoin::RoundEvent;
use tokio::sync::broadcast;

/// Upper bound on how long a test waits for a single event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive the next event, failing the test if none arrives in time.
pub async fn next_event(rx: &mut broadcast::Receiver<RoundEvent>) -> RoundEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for round event")
        .expect("event channel closed")
}

/// Receive events until one matches `pred`, returning everything received.
pub async fn collect_until(
    rx: &mut broadcast::Receiver<RoundEvent>,
    pred: impl Fn(&RoundEvent) -> bool,
) -> Vec<RoundEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Short name of an event, for order assertions.
pub fn event_name(event: &RoundEvent) -> &'static str {
    match event {
        RoundEvent::PhaseChanged { .. } => "phase-changed",
        RoundEvent::CoinSelectionStarted { .. } => "selection-started",
        RoundEvent::CoinSelectionFinished { .. } => "selection-finished",
        RoundEvent::CoinRegistrationFinished { .. } => "registration-finished",
        RoundEvent::PolicyFailed { .. } => "policy-failed",
    }
}

pub fn is_registration_finished(event: &RoundEvent) -> bool {
    matches!(event, RoundEvent::CoinRegistrationFinished { .. })
}

pub fn is_phase_changed(event: &RoundEvent) -> bool {
    matches!(event, RoundEvent::PhaseChanged { .. })
}
