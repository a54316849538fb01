//! Reconnect policy.
//!
//! The default matches the behavior this viewer is meant to preserve: a flat
//! 2 second delay between attempts and no attempt limit. Both knobs are
//! explicit so deployments can opt into a capped exponential schedule or a
//! maximum attempt count instead of editing the loop.

use std::time::Duration;

/// Flat reconnect delay used when nothing else is configured.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Delay schedule between reconnect attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every attempt.
    Flat(Duration),
    /// `base * 2^attempt`, clamped to `cap`.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay before the given zero-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Flat(delay) => *delay,
            Backoff::Exponential { base, cap } => {
                let shift = attempt.min(16);
                let delay = base.saturating_mul(1u32 << shift);
                delay.min(*cap)
            }
        }
    }
}

/// Retry policy for the reconnection state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// `None` retries forever; availability is preferred over fail-fast.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::Flat(DEFAULT_RECONNECT_DELAY),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn flat(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Flat(delay),
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// True once the given number of attempts has used up the limit.
    pub fn exhausted(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_made >= max,
            None => false,
        }
    }
}
