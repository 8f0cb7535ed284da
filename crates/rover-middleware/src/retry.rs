//! Bounded exponential backoff for link writes.

use std::time::Duration;

/// How many times to try a link write and how long to wait in between.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rover_middleware::RetryPolicy;
///
/// let policy = RetryPolicy::new(4, Duration::from_millis(100), Duration::from_millis(250));
/// let waits: Vec<_> = policy.delays().collect();
/// assert_eq!(
///     waits,
///     vec![
///         Duration::from_millis(100),
///         Duration::from_millis(200),
///         Duration::from_millis(250),
///     ]
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Wait before retry number `retry` (0 = the first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// The waits between consecutive attempts (`attempts − 1` of them).
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts.saturating_sub(1)).map(|retry| self.backoff(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(2))
    }
}
