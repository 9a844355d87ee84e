//! Retry policy and backoff calculation for queued jobs.

use std::time::Duration;

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff: the n-th retry waits
/// `base_delay * 2^(n-1)`. With `max_delay` set, every wait is capped at it,
/// provider hints included.
///
/// ```rust
/// # use nudge::RetryPolicy;
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .base_delay(Duration::from_millis(200));
/// assert_eq!(policy.delay_for_retry(3), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1s.
    pub base_delay: Duration,
    /// Upper bound on any single wait. Default: none.
    pub max_delay: Option<Duration>,
    /// Whether a provider's `retry_after` hint replaces the computed delay. Default: true.
    pub honor_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: None,
            honor_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy that disables retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries after the first attempt.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Cap every wait at `delay`.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Enable or disable `retry_after` hints.
    pub fn honor_retry_after(mut self, enabled: bool) -> Self {
        self.honor_retry_after = enabled;
        self
    }

    /// Delay before retry number `retry` (1-indexed).
    ///
    /// Does NOT consider `retry_after` hints; see
    /// [`effective_delay()`](Self::effective_delay) for the full calculation.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        self.cap(delay)
    }

    /// Calculate the effective delay, respecting provider `retry_after` hints.
    pub fn effective_delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if self.honor_retry_after => self.cap(hint),
            _ => self.delay_for_retry(retry),
        }
    }

    fn cap(&self, delay: Duration) -> Duration {
        self.max_delay.map_or(delay, |max| delay.min(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_from_base() {
        let policy = RetryPolicy::new();
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(4000));
    }

    #[test]
    fn uncapped_by_default() {
        assert_eq!(
            RetryPolicy::new().delay_for_retry(7),
            Duration::from_secs(64)
        );
    }

    #[test]
    fn capped_at_max_delay() {
        let policy = RetryPolicy::new().max_delay(Duration::from_millis(2500));
        assert_eq!(policy.delay_for_retry(10), Duration::from_millis(2500));
    }

    #[test]
    fn cap_applies_to_retry_after_hint() {
        let policy = RetryPolicy::new().max_delay(Duration::from_secs(10));
        assert_eq!(
            policy.effective_delay(1, Some(Duration::from_secs(120))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn retry_after_hint_wins_when_honored() {
        let hint = Some(Duration::from_millis(50));
        assert_eq!(
            RetryPolicy::new().effective_delay(1, hint),
            Duration::from_millis(50)
        );
        assert_eq!(
            RetryPolicy::new()
                .honor_retry_after(false)
                .effective_delay(1, hint),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn disabled_has_no_retries() {
        assert_eq!(RetryPolicy::disabled().max_retries, 0);
    }
}
