// Fixed-delay retry for connection establishment

use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// How often and how patiently to retry a failing operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        RetryPolicy { attempts, delay }
    }

    /// Run `op` until it succeeds or attempts are exhausted, sleeping the
    /// calling thread between attempts. `op` receives the 1-based attempt.
    pub fn run_blocking<T, E, F>(&self, label: &str, mut op: F) -> RetryResult<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let max_attempts = self.attempts.max(1);
        let start = Instant::now();
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => {
                    debug!(target: "fleet::retry", %label, attempt, "succeeded");
                    return RetryResult::Success(value);
                }
                Err(e) if attempt >= max_attempts => {
                    return RetryResult::Failed {
                        last_error: e,
                        attempts: attempt,
                        total_time: start.elapsed(),
                    };
                }
                Err(e) => {
                    warn!(
                        target: "fleet::retry",
                        %label,
                        attempt,
                        max_attempts,
                        error = %e,
                        "attempt failed, retrying in {:?}",
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded
    Success(T),
    /// Operation failed after all retries
    Failed {
        last_error: E,
        attempts: u32,
        total_time: Duration,
    },
}
