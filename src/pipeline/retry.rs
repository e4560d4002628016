//! Bounded fixed-delay retry, kept separate from the processing flow.

use std::time::Duration;

/// Attempts made for PDF engine initialization.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before attempt `attempt` (1-based); `None` for the first attempt
    /// and for attempts past the limit.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        (attempt > 1 && attempt <= self.max_attempts).then_some(self.delay)
    }

    /// Every pause the policy would take, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (2..=self.max_attempts)
            .filter_map(|a| self.delay_before(a))
            .collect()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned.
    pub fn run<T, E, F, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    attempt += 1;
                    if let Some(delay) = self.delay_before(attempt) {
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
