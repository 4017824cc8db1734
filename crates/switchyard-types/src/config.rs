//! Configuration types for the messaging runtime.
//!
//! `MessagingConfig` is the top-level `switchyard.toml`. Every field has a
//! default, so an empty file (or no file at all) is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::MessagingError;

/// Top-level messaging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Retry policy applied by polling consumers. No retries when absent.
    #[serde(default)]
    pub retry: Option<RetryConfig>,

    /// Channel receiving messages whose retries are exhausted.
    #[serde(default)]
    pub dead_letter_channel: Option<String>,

    /// Pause between polls of an empty queue channel, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound of messages handled in a single poll.
    #[serde(default = "default_max_messages_per_poll")]
    pub max_messages_per_poll: usize,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_messages_per_poll() -> usize {
    100
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            retry: None,
            dead_letter_channel: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_messages_per_poll: default_max_messages_per_poll(),
        }
    }
}

impl MessagingConfig {
    /// Reject values a consumer cannot run with.
    pub fn validate(&self) -> Result<(), MessagingError> {
        if self.max_messages_per_poll == 0 {
            return Err(MessagingError::configuration(
                "max_messages_per_poll must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Backoff policy as written in configuration.
///
/// Validation (all values strictly positive) happens when it is turned into a
/// retry template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    #[serde(default)]
    pub max_delay_ms: Option<u64>,

    /// Retries after the first failed attempt. Unbounded when absent.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_multiplier() -> u32 {
    1
}
