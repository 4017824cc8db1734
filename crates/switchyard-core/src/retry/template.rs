//! Backoff schedule for retried messages.

use std::time::Duration;

use switchyard_types::MessagingError;
use switchyard_types::config::RetryConfig;

// ---------------------------------------------------------------------------
// RetryTemplate
// ---------------------------------------------------------------------------

/// Immutable backoff policy. Build one with [`RetryTemplateBuilder`].
///
/// The delay before retry `n` (1-based) is
/// `min(max_delay, initial_delay * multiplier^(n - 1))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTemplate {
    initial_delay_ms: u64,
    multiplier: u32,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

impl RetryTemplate {
    /// Delay in milliseconds before retry number `attempt`.
    pub fn calculate_next_delay(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let delay = u64::from(self.multiplier)
            .checked_pow(exponent)
            .and_then(|factor| self.initial_delay_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);

        match self.max_delay_ms {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.calculate_next_delay(attempt))
    }

    /// Whether retry number `attempt` is allowed.
    pub fn can_be_called_next_time(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }

    /// Delays of every allowed retry, in order. Unbounded without a maximum
    /// number of attempts.
    pub fn delays(&self) -> impl Iterator<Item = u64> + '_ {
        (1..)
            .take_while(|attempt| self.can_be_called_next_time(*attempt))
            .map(|attempt| self.calculate_next_delay(attempt))
    }

    pub fn initial_delay_ms(&self) -> u64 {
        self.initial_delay_ms
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn max_delay_ms(&self) -> Option<u64> {
        self.max_delay_ms
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl TryFrom<&RetryConfig> for RetryTemplate {
    type Error = MessagingError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        let mut builder = match config.max_delay_ms {
            Some(max_delay) => RetryTemplateBuilder::exponential_backoff_with_max_delay(
                config.initial_delay_ms,
                config.multiplier,
                max_delay,
            ),
            None => RetryTemplateBuilder::exponential_backoff(config.initial_delay_ms, config.multiplier),
        };
        if let Some(max_attempts) = config.max_attempts {
            builder = builder.max_retry_attempts(max_attempts);
        }
        builder.build()
    }
}

// ---------------------------------------------------------------------------
// RetryTemplateBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RetryTemplateBuilder {
    initial_delay_ms: u64,
    multiplier: u32,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

impl RetryTemplateBuilder {
    /// Every retry waits `initial_delay_ms`.
    pub fn fixed_back_off(initial_delay_ms: u64) -> Self {
        Self::exponential_backoff(initial_delay_ms, 1)
    }

    pub fn exponential_backoff(initial_delay_ms: u64, multiplier: u32) -> Self {
        Self {
            initial_delay_ms,
            multiplier,
            max_delay_ms: None,
            max_attempts: None,
        }
    }

    pub fn exponential_backoff_with_max_delay(initial_delay_ms: u64, multiplier: u32, max_delay_ms: u64) -> Self {
        Self {
            max_delay_ms: Some(max_delay_ms),
            ..Self::exponential_backoff(initial_delay_ms, multiplier)
        }
    }

    pub fn max_retry_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn build(self) -> Result<RetryTemplate, MessagingError> {
        if self.initial_delay_ms == 0 {
            return Err(MessagingError::configuration("initial delay must be greater than 0"));
        }
        if self.multiplier == 0 {
            return Err(MessagingError::configuration("multiplier must be greater than 0"));
        }
        if self.max_delay_ms == Some(0) {
            return Err(MessagingError::configuration("max delay must be greater than 0"));
        }
        if self.max_attempts == Some(0) {
            return Err(MessagingError::configuration("max attempts must be greater than 0"));
        }

        Ok(RetryTemplate {
            initial_delay_ms: self.initial_delay_ms,
            multiplier: self.multiplier,
            max_delay_ms: self.max_delay_ms,
            max_attempts: self.max_attempts,
        })
    }
}
