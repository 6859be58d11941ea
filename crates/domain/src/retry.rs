//! Bounded retry with exponential backoff.
//!
//! [`retry_when`] re-runs an async operation while a predicate classifies its
//! failure as retryable. The delivery tracking update protocol uses it for
//! version conflicts and the transaction helper for conflicts and transient
//! infrastructure errors.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles after each further failure.
    pub base_delay: Duration,

    /// Upper bound for a single delay, jitter included.
    pub max_delay: Duration,

    /// Upper bound of the random delay added to each backoff.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// The delivery tracking protocol: 3 attempts, waiting
    /// `min(1000ms * 2^attempt + jitter, 5000ms)` between them.
    pub fn optimistic_update() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            jitter: Duration::from_millis(1000),
        }
    }

    /// Re-running a whole multi-document transaction: quick, short and jittered
    /// so racing writers spread out.
    pub fn transaction() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
            jitter: Duration::from_millis(20),
        }
    }

    /// Plain exponential backoff (`base_delay * 2^attempt`) without cap or jitter.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: Duration::MAX,
            jitter: Duration::ZERO,
        }
    }

    /// Retries back to back. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::exponential(max_attempts, Duration::ZERO)
    }

    /// Returns the delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.saturating_mul(1u32 << attempt.min(20));
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rand::thread_rng().gen_range(0..=max))
        };
        backoff.saturating_add(jitter).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::optimistic_update()
    }
}

/// Why [`retry_when`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; holds the last one.
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error the predicate did not accept.
    Permanent(E),
}

impl<E> RetryError<E> {
    /// Returns the underlying error, discarding the attempt count.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(err) => err,
        }
    }
}

/// Runs `op` until it succeeds, fails with an error `should_retry` rejects,
/// or `policy.max_attempts` attempts have been made.
pub async fn retry_when<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !should_retry(&err) => return Err(RetryError::Permanent(err)),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts.max(1) {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }

                let delay = policy.delay_for(attempt - 1);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after retryable failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
