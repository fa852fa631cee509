/// Exponential backoff schedule with jitter and an attempt budget
use rand::Rng;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Maximum delay for any single retry
    pub max_backoff: Duration,
    /// Backoff multiplier applied per consecutive failure
    pub backoff_multiplier: f64,
    /// Add random jitter to each delay (±30%)
    pub jitter: bool,
    /// Consecutive failed attempts allowed before giving up (`None` = unbounded)
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            max_attempts: Some(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before retry number `attempt` (1-based).
    ///
    /// `initial × multiplier^(attempt-1)`, capped at `max_backoff`, then jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = Duration::from_millis(base_ms.min(self.max_backoff.as_millis() as f64) as u64);

        let delay = apply_jitter(capped, self.jitter);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Computed backoff delay");
        delay
    }

    /// Whether another attempt is allowed after `attempt` consecutive failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let mut rng = rand::thread_rng();
        let jitter_factor = 1.0 + rng.gen_range(-0.3..0.3); // ±30%
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}
