//! Reusable exponential-backoff retry policy.
//!
//! One policy object is shared by the generation client's transient
//! retries and anything else that needs bounded wait-and-retry
//! behaviour, so backoff tuning lives in exactly one place.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Fraction of the delay randomized in `[1 - jitter, 1 + jitter]`.
    /// Zero disables jitter (deterministic, used by tests).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` attempts have
    /// already failed.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Backoff delay before attempt `attempt + 1`, where `attempt` is
    /// the 1-based number of the attempt that just failed.
    ///
    /// The undelayed exponential value is clamped to `max_delay` before
    /// jitter is applied.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base_ms = (self.initial_delay.as_millis() as f64 * exp)
            .min(self.max_delay.as_millis() as f64);

        let jittered_ms = if self.jitter > 0.0 {
            let factor = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
            base_ms * factor
        } else {
            base_ms
        };

        Duration::from_millis(jittered_ms.max(0.0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
