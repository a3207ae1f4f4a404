use forgeflow_core::api::{RetryConfig, RetryStrategy};
use std::time::Duration;

/// Delay grows by `base_delay_ms` per attempt instead of doubling.
pub struct LinearRetry {
    config: RetryConfig,
}

impl LinearRetry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategy for LinearRetry {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        let multiplier = attempt.saturating_add(1) as u64;
        let delay = self.config.base_delay_ms.saturating_mul(multiplier);
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
    fn grows_linearly_until_capped() {
        let retry = LinearRetry::new(RetryConfig {
            base_delay_ms: 50,
            max_delay_ms: 120,
            max_attempts: 4,
        });
        assert_eq!(retry.next_delay(0, "err").unwrap().as_millis(), 50);
        assert_eq!(retry.next_delay(1, "err").unwrap().as_millis(), 100);
        assert_eq!(retry.next_delay(2, "err").unwrap().as_millis(), 120);
        assert_eq!(retry.next_delay(4, "err"), None);
        assert!(retry.should_retry(3, "err"));
        assert!(!retry.should_retry(4, "err"));
    }
}
