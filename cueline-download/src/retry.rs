//! Exponential backoff for transient download failures.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_attempts: u32,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2,
            max_attempts: 4,
            cap: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before attempt `attempt` (1-indexed), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(exp).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5), Duration::from_secs(8));
    }
}
