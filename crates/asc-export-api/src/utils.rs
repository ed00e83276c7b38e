//! Common utilities shared by the exporter crates

use std::time::Duration;

/// Exponential backoff policy for per-cell fetches.
///
/// `delay(attempt) = base_delay + step_delay * 2^attempt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of fetch attempts per cell
    pub max_attempts: u32,
    /// Constant part of every delay
    pub base_delay: Duration,
    /// Exponentially growing part of every delay
    pub step_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(3),
            step_delay: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    /// Creates a new backoff policy with custom settings
    pub fn new(max_attempts: u32, base_delay: Duration, step_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            step_delay,
        }
    }

    /// Pause after the given zero-based attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_add(self.step_delay.saturating_mul(factor))
    }

    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

/// Transient retry bookkeeping for one cell. Never shared between cells.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: BackoffPolicy,
    attempts: u32,
    delays: Vec<Duration>,
}

impl RetryState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            delays: Vec::new(),
        }
    }

    /// Registers the start of an attempt and returns the pause that follows it
    pub fn begin_attempt(&mut self) -> Duration {
        let delay = self.policy.delay(self.attempts);
        self.attempts += 1;
        self.delays.push(delay);
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.policy.is_exhausted(self.attempts)
    }

    /// Pauses taken so far, one per attempt
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}
