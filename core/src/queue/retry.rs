use std::time::Duration;

/// Backoff policy a lane consults after a retryable job failure.
pub trait RetryStrategy: Send + Sync {
    fn name(&self) -> &str;
    /// Delay before the attempt following `attempt` (zero-based), `None` once exhausted.
    fn next_delay(&self, attempt: u32, error: &str) -> Option<Duration>;
    fn max_attempts(&self) -> u32;
    fn should_retry(&self, attempt: u32, error: &str) -> bool {
        attempt < self.max_attempts() && !self.is_fatal_error(error)
    }
    fn is_fatal_error(&self, _error: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        let exp = 1u64 << attempt.min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let backoff = ExponentialBackoff::new(RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 300,
            max_attempts: 3,
        });
        assert_eq!(backoff.next_delay(0, "err").unwrap().as_millis(), 100);
        assert_eq!(backoff.next_delay(1, "err").unwrap().as_millis(), 200);
        assert_eq!(backoff.next_delay(2, "err").unwrap().as_millis(), 300);
        assert_eq!(backoff.next_delay(3, "err"), None);
    }

    #[test]
    fn should_retry_respects_attempt_budget() {
        let backoff = ExponentialBackoff::new(RetryConfig {
            base_delay_ms: 1,
            max_delay_ms: 10,
            max_attempts: 2,
        });
        assert!(backoff.should_retry(1, "err"));
        assert!(!backoff.should_retry(2, "err"));
    }
}
