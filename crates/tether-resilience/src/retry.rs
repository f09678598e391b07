//! Retry schedule.

use std::time::Duration;

/// Default number of attempts per call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delays between attempts, in seconds.
pub const DEFAULT_BACKOFF_SECS: [u64; 3] = [2, 4, 8];

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_retries: u32,
    /// Delay after the n-th failed attempt; the last entry repeats.
    pub backoff: Vec<Duration>,
    /// Bound on each attempt; exceeding it counts as a transient failure.
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_secs(DEFAULT_MAX_RETRIES, &DEFAULT_BACKOFF_SECS)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_retries,
            backoff,
            call_timeout: None,
        }
    }

    /// Build from a backoff schedule given in whole seconds.
    pub fn from_secs(max_retries: u32, backoff_secs: &[u64]) -> Self {
        Self::new(
            max_retries,
            backoff_secs.iter().copied().map(Duration::from_secs).collect(),
        )
    }

    /// No delay between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Vec::new())
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or(self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.call_timeout, None);
    }

    #[test]
    fn test_last_delay_is_reused() {
        let policy = RetryPolicy::from_secs(6, &[1, 5]);
        assert_eq!(policy.delay_for(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
    }

    #[test]
    fn test_empty_schedule_means_no_delay() {
        let policy = RetryPolicy::immediate(4);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(9), Duration::ZERO);
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
    }
}
