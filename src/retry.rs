use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded retry-with-delay runner for remote calls. The budget is fixed at
/// construction; an attempt count below 1 is bumped to 1.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    attempts: u32,
    delay:    Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or the budget is spent, sleeping between
    /// attempts. Returns the last error when every attempt failed. The
    /// operation must be safe to repeat: a failed attempt is never rolled
    /// back.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.attempts {
                        return Err(err);
                    }
                    log::warn!(
                        "remote call failed on attempt {attempt}/{}: {err}; retrying in {:?}",
                        self.attempts,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
