//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sync endpoint URL.
    pub server_url: String,
    /// Retry configuration for one pass.
    pub retry: RetryConfig,
    /// Interval of the periodic background sweep.
    pub sweep_interval: Duration,
    /// Pass duration beyond which a performance warning is logged.
    pub slow_pass_threshold: Duration,
    /// Request timeout handed to the transport.
    pub request_timeout: Duration,
    /// Conflicts-per-response count above which an alert is raised.
    pub conflict_alert_threshold: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration with default tuning.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            retry: RetryConfig::default(),
            sweep_interval: Duration::from_secs(30),
            slow_pass_threshold: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            conflict_alert_threshold: 5,
        }
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the periodic sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the slow-pass warning threshold.
    pub fn with_slow_pass_threshold(mut self, threshold: Duration) -> Self {
        self.slow_pass_threshold = threshold;
        self
    }

    /// Sets the transport request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Configuration for retry behavior within one sync pass.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per pass (first try plus retries).
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt ceiling.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay ceiling.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculates the backoff delay before the given attempt (0-indexed).
    ///
    /// Attempt 0 is the initial try and has no delay; retry `n` sleeps
    /// `base_delay * 2^(n-1)`, capped at `max_delay`. With the defaults the
    /// sequence is 1s, 2s, 4s.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // Saturate once the doubling overflows; max_delay caps the result.
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        // 1 initial try + 3 retries
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://sync.gather.example")
            .with_sweep_interval(Duration::from_secs(10))
            .with_request_timeout(Duration::from_secs(15));

        assert_eq!(config.server_url, "https://sync.gather.example");
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.conflict_alert_threshold, 5);
    }

    #[test]
    fn default_backoff_sequence() {
        let retry = RetryConfig::default();

        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_respects_ceiling() {
        let retry = RetryConfig::new(10)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30));

        assert_eq!(retry.delay_for_attempt(5), Duration::from_secs(16));
        assert_eq!(retry.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(retry.delay_for_attempt(9), Duration::from_secs(30));
    }

    #[test]
    fn large_attempt_counts_saturate_at_ceiling() {
        let retry = RetryConfig::new(40)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30));

        // Doublings past the u32 range must cap, not overflow.
        assert_eq!(retry.delay_for_attempt(32), Duration::from_secs(30));
        assert_eq!(retry.delay_for_attempt(33), Duration::from_secs(30));
        assert_eq!(retry.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn no_retry_config() {
        let retry = RetryConfig::no_retry();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.delay_for_attempt(1), Duration::ZERO);
    }
}
