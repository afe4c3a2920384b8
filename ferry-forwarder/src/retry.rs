//! Retry classification and backoff schedule

use std::time::Duration;

/// Overload/unavailability statuses worth retrying.
///
/// Everything else, 401/403 included, is returned to the caller as-is.
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

/// Capped exponential backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            multiplier,
            max,
        }
    }

    /// The computed delay for the next transient outcome
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Delay to sleep after a transient outcome.
    ///
    /// A positive server hint wins even when it exceeds the computed delay.
    pub fn delay_for(&self, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if !hint.is_zero() => hint,
            _ => self.current,
        }
    }

    /// Grows the computed delay after a transient outcome
    pub fn advance(&mut self) {
        self.current = self.current.mul_f64(self.multiplier).min(self.max);
    }
}

/// Parses a `Retry-After` header in its delta-seconds form
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
