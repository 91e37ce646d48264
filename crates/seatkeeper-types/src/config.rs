//! Runtime configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, SeatkeeperError, constants};

/// Configuration for one Seatkeeper runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of each instance's bounded facet mailbox.
    pub facet_mailbox_capacity: usize,
    /// Start time of manual timers built from this config.
    pub manual_timer_start: u64,
    /// Prefix for board identifiers.
    pub board_prefix: String,
    /// `tracing` filter directive used when no `RUST_LOG` is set.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            facet_mailbox_capacity: constants::DEFAULT_FACET_MAILBOX_CAPACITY,
            manual_timer_start: constants::DEFAULT_MANUAL_TIMER_START,
            board_prefix: constants::DEFAULT_BOARD_PREFIX.to_string(),
            log_filter: constants::DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    /// `Serialization` on malformed JSON, `Configuration` on invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, otherwise as [`Self::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// # Errors
    /// `Configuration` if a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.facet_mailbox_capacity == 0 {
            return Err(SeatkeeperError::Configuration(
                "facet_mailbox_capacity must be > 0".into(),
            ));
        }
        if self.board_prefix.is_empty() || self.board_prefix.chars().any(|c| c.is_ascii_digit()) {
            return Err(SeatkeeperError::Configuration(
                "board_prefix must be non-empty and contain no digits".into(),
            ));
        }
        Ok(())
    }
}
