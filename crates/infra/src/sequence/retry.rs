use std::time::{Duration, SystemTime};

/// Bounded retry budget for sequence allocation conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total compare-and-set attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubled after every conflict.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Backoff after `conflicts` consecutive conflicts (1-based), with up to
    /// 25% jitter so that racing callers spread out.
    pub(crate) fn backoff(&self, conflicts: u32) -> Duration {
        let exponent = conflicts.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);

        let jitter = base.mul_f64(0.25 * jitter_fraction());
        base + jitter
    }
}

/// Pseudo-random fraction in `[0, 1)` taken from the clock.
fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
