//! Retry delay schedule for batch delivery.

use std::time::Duration;

use domain::{RetryPolicy, TelemetrySettings};
use rand::Rng;

/// Exponential backoff with proportional jitter.
///
/// Attempt `n` (1-based) waits `initial * 2^(n-1)`, capped at `max`, then
/// scaled by a random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    /// Default jitter factor.
    pub const DEFAULT_JITTER: f64 = 0.3;

    /// Creates a schedule. `jitter` is clamped to `[0, 1]`.
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Builds the schedule from the telemetry settings.
    pub fn from_settings(settings: &TelemetrySettings) -> Self {
        Self::new(
            settings.backoff_initial,
            settings.backoff_max,
            Self::DEFAULT_JITTER,
        )
    }

    /// Delay before the attempt following failed attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let base = self
            .initial
            .saturating_mul(1u32 << exp)
            .min(self.max);

        if self.jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        base.mul_f64(factor)
    }

    /// Delay honouring a server-requested wait when one was given.
    ///
    /// The server's value wins when it is longer than the computed delay, but
    /// is never allowed past the schedule's ceiling.
    pub fn delay_for(&self, attempt: u32, policy: RetryPolicy) -> Duration {
        let computed = self.delay(attempt);
        match policy {
            RetryPolicy::Retryable { after: Some(after) } => after.max(computed).min(self.max),
            _ => computed,
        }
    }
}
