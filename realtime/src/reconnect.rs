//! Reconnect policy applied when the liveness check finds the channel unjoined.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ReconnectPolicy {
    #[default]
    /// Log the unjoined channel and leave recovery to process supervision.
    None,
    /// Rejoin with exponentially increasing delays.
    Backoff(BackoffPolicy),
}

/// Exponential backoff, capped at a maximum delay.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl BackoffPolicy {
    /// Create a new backoff policy with default delays.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Maximum number of rejoin attempts per liveness check
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the attempt following `n_past_retries` failures, or `None`
    /// once retries are exhausted.
    pub fn delay_for(&self, n_past_retries: u32) -> Option<Duration> {
        if n_past_retries >= self.max_retries {
            None
        } else {
            Some(self.exponential_delay(n_past_retries))
        }
    }

    fn exponential_delay(&self, n_attempts: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * 2_f64.powi(n_attempts.min(32) as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}
