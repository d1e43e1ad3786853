use crate::error::{Result, ServiceModelError};
use std::time::{Duration, Instant};

/// One caller timeout shared across the phases of an operation
///
/// Open and close run several steps (hooks, inner transports, tracked
/// channels); each step gets whatever is left of the original budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    operation: &'static str,
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Start the clock for `operation`
    pub fn after(operation: &'static str, timeout: Duration) -> Self {
        Self {
            operation,
            started: Instant::now(),
            timeout,
        }
    }

    /// Time left; zero once expired
    #[inline]
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.timeout
    }

    /// Time left, or a `Timeout` error naming the operation
    pub fn check(&self) -> Result<Duration> {
        if self.is_expired() {
            Err(ServiceModelError::timeout(self.operation, self.timeout))
        } else {
            Ok(self.remaining())
        }
    }

    /// The full budget this deadline was created with
    pub fn original(&self) -> Duration {
        self.timeout
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}
