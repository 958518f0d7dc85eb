//! Retry policy for durable transfers.
//!
//! Lazy Pirate style: resend on ack timeout, back off on send failure, and
//! track peer health from acknowledgements rather than link state. Backoff is
//! capped so a long disconnection never turns into hour-long retry gaps.

use spotconf::TransferConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// How long to wait for an ack before resending
    pub ack_timeout: Duration,
    /// Initial backoff after a failed send
    pub backoff_base: Duration,
    /// Maximum backoff between attempts (caps exponential growth)
    pub backoff_max: Duration,
    /// Consecutive failures before marking the peer as dead
    pub max_failures: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&TransferConfig::default())
    }
}

impl From<&TransferConfig> for RetryConfig {
    fn from(config: &TransferConfig) -> Self {
        Self {
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            max_failures: config.max_failures,
        }
    }
}

impl RetryConfig {
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Calculate backoff delay for a given attempt number
    ///
    /// attempt 1: backoff_base
    /// attempt 2: backoff_base * 2
    /// attempt n: min(backoff_base * 2^(n-1), backoff_max)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.backoff_base.saturating_mul(multiplier);
        std::cmp::min(delay, self.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff_for_attempt(0), Duration::ZERO);
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for_attempt(4), Duration::from_millis(800));
        assert_eq!(config.backoff_for_attempt(7), Duration::from_secs(5));
        assert_eq!(config.backoff_for_attempt(40), Duration::from_secs(5));
    }

    #[test]
    fn test_from_transfer_config() {
        let transfer = TransferConfig {
            ack_timeout_ms: 500,
            ..TransferConfig::default()
        };
        let retry = RetryConfig::from(&transfer);
        assert_eq!(retry.ack_timeout, Duration::from_millis(500));
        assert_eq!(retry.max_failures, 5);
    }
}
