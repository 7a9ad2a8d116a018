// Copyright (c) 2024 Botho Foundation

//! Configuration for a round participant.
//!
//! ```toml
//! min_registration_cap = 10
//! max_registration_cap = 20
//! event_capacity = 64
//! ```

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default lower bound of the per-round registration cap.
pub const DEFAULT_MIN_REGISTRATION_CAP: usize = 10;

/// Default upper bound of the per-round registration cap.
pub const DEFAULT_MAX_REGISTRATION_CAP: usize = 20;

/// Default buffer size of the outward event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Round participant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinJoinConfig {
    /// Smallest registration cap a round may draw (inclusive).
    #[serde(default = "default_min_registration_cap")]
    pub min_registration_cap: usize,

    /// Largest registration cap a round may draw (inclusive).
    #[serde(default = "default_max_registration_cap")]
    pub max_registration_cap: usize,

    /// Events buffered per subscriber before the slowest one starts lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_min_registration_cap() -> usize {
    DEFAULT_MIN_REGISTRATION_CAP
}

fn default_max_registration_cap() -> usize {
    DEFAULT_MAX_REGISTRATION_CAP
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for CoinJoinConfig {
    fn default() -> Self {
        Self {
            min_registration_cap: default_min_registration_cap(),
            max_registration_cap: default_max_registration_cap(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl CoinJoinConfig {
    /// A configuration whose registration cap is always `cap`.
    pub fn with_fixed_cap(cap: usize) -> Self {
        Self {
            min_registration_cap: cap,
            max_registration_cap: cap,
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CoinJoinConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_registration_cap == 0 || self.min_registration_cap > self.max_registration_cap
        {
            return Err(ConfigError::InvalidCapRange {
                min: self.min_registration_cap,
                max: self.max_registration_cap,
            });
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }

        Ok(())
    }

    /// Draw a registration cap uniformly from the configured range.
    ///
    /// Called once per round. Resampling mid-round would let the coordinator
    /// tell clients apart by how their cap moves.
    pub fn draw_registration_cap<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(self.min_registration_cap..=self.max_registration_cap)
    }
}
