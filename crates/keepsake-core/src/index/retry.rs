//! Bounded retry with exponential backoff and jitter.
//!
//! Independent of the index engine: the caller supplies the operation and a
//! predicate deciding which errors are worth another try.

use rand::Rng;
use std::thread;
use std::time::Duration;

/// Retry policy. `max_attempts` counts the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl Backoff {
    /// Policy that retries immediately. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Deterministic part of the delay after failed attempt `attempt` (0-based):
    /// `base_delay * 2^attempt`, saturating.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay_for(attempt) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the attempt
/// budget is spent. `op` receives the 0-based attempt number. The last error is
/// returned when every attempt fails.
pub fn attempt<T, E, F, P>(backoff: &Backoff, mut op: F, is_transient: P) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    P: Fn(&E) -> bool,
{
    let attempts = backoff.max_attempts.max(1);
    let mut n = 0;
    loop {
        match op(n) {
            Ok(value) => return Ok(value),
            Err(e) if n + 1 < attempts && is_transient(&e) => {
                let delay = backoff.delay_for(n);
                log::debug!(
                    "attempt {}/{} failed transiently, retrying in {:?}",
                    n + 1,
                    attempts,
                    delay
                );
                thread::sleep(delay);
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
