//! Retry with a fixed backoff schedule for transient generation failures

use std::fmt;
use std::time::Duration;

use crate::error::GenerationError;

/// Default schedule: wait 30s, then 60s, before giving up.
pub const DEFAULT_BACKOFF: [Duration; 2] = [Duration::from_secs(30), Duration::from_secs(60)];

/// Sleep function used between attempts.
pub type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Re-runs an operation while it fails with a retryable error.
///
/// Makes at most `1 + schedule.len()` attempts. Non-retryable errors are
/// returned after the attempt that produced them; once the schedule is
/// used up the last error is returned.
pub struct RetryExecutor {
    schedule: Vec<Duration>,
    sleep: Sleeper,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF.to_vec())
    }
}

impl RetryExecutor {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self {
            schedule,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the sleep function (tests record delays instead of waiting).
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.schedule.len() + 1
    }

    /// Run `operation`, retrying per the schedule.
    ///
    /// Every attempt is a full re-invocation, so the operation must be safe
    /// to repeat.
    pub fn call<T>(
        &self,
        mut operation: impl FnMut() -> Result<T, GenerationError>,
    ) -> Result<T, GenerationError> {
        let mut delays = self.schedule.iter();
        let mut attempt = 1usize;
        loop {
            match operation() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() => match delays.next() {
                    Some(delay) => {
                        log::warn!(
                            "attempt {attempt}/{} failed: {e}, retrying in {}s",
                            self.max_attempts(),
                            delay.as_secs_f64()
                        );
                        (self.sleep)(*delay);
                        attempt += 1;
                    }
                    None => {
                        log::error!("giving up after {attempt} attempts: {e}");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}
