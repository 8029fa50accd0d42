use std::time::Duration;

/// The default number of attempts per request.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 5;

/// The default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// A fixed-delay retry policy.
///
/// A request is attempted up to [`attempts`](RetryPolicy::attempts) times, sleeping the calling
/// thread for [`delay`](RetryPolicy::delay) between attempts. The delay does not grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: usize,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Set the maximum number of attempts. Zero is treated as one.
    #[must_use]
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Set the delay between attempts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The maximum number of attempts.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// The delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `request` until it succeeds or the attempts are exhausted.
    ///
    /// `on_retry` is called with the attempt number (from 1) and the error of every failed attempt
    /// that is followed by another.
    ///
    /// # Errors
    /// Returns the error of the final attempt if every attempt fails.
    pub fn run<T, E>(
        &self,
        mut request: impl FnMut() -> Result<T, E>,
        mut on_retry: impl FnMut(usize, &E),
    ) -> Result<T, E> {
        let mut attempt = 1;
        loop {
            match request() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts => {
                    on_retry(attempt, &err);
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
