//! Retry with exponential backoff and a per-attempt timeout

use crate::config::RetryConfig;
use lectern_domain::Retryable;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Why a retried operation gave up
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The error was not transient; no further attempts were made
    #[error("{operation} failed: {error}")]
    Permanent {
        /// Operation name
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Last error
        error: E,
    },

    /// Every attempt failed with a transient error
    #[error("{operation} failed after {attempts} attempts: {error}")]
    Exhausted {
        /// Operation name
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Last error
        error: E,
    },

    /// The last attempt did not finish in time
    #[error("{operation} timed out after {attempts} attempts ({timeout:?} each)")]
    TimedOut {
        /// Operation name
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Per-attempt limit
        timeout: Duration,
    },
}

/// Error of a call run on tokio's blocking pool
#[derive(Debug, Clone, PartialEq)]
pub enum BlockingError<E> {
    /// The call itself failed
    Call(E),
    /// The blocking task panicked or was cancelled
    Join(String),
}

impl<E: fmt::Display> fmt::Display for BlockingError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingError::Call(e) => write!(f, "{}", e),
            BlockingError::Join(e) => write!(f, "task join error: {}", e),
        }
    }
}

impl<E: Retryable> Retryable for BlockingError<E> {
    fn is_transient(&self) -> bool {
        match self {
            BlockingError::Call(e) => e.is_transient(),
            BlockingError::Join(_) => false,
        }
    }
}

/// Run a synchronous collaborator call on the blocking pool
pub async fn run_blocking<T, E, F>(f: F) -> Result<T, BlockingError<E>>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BlockingError::Join(e.to_string()))?
        .map_err(BlockingError::Call)
}

/// Explicit retry policy: attempt budget, exponential backoff schedule and
/// per-attempt timeout
///
/// Only errors classified transient are retried. A timed-out attempt is
/// retried by [`RetryPolicy::run`], whose futures stop when dropped, and is
/// final under [`RetryPolicy::run_detached`], whose work keeps running.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        multiplier: f64,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            multiplier,
            attempt_timeout,
        }
    }

    /// Build a policy from configuration
    pub fn from_config(config: &RetryConfig, attempt_timeout: Duration) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.multiplier,
            attempt_timeout,
        )
    }

    /// Single attempt, no backoff
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0, attempt_timeout)
    }

    /// Total attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Per-attempt timeout
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Waits between consecutive attempts
    ///
    /// ```
    /// use lectern_extractor::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(
    ///     4,
    ///     Duration::from_millis(100),
    ///     Duration::from_millis(300),
    ///     2.0,
    ///     Duration::from_secs(1),
    /// );
    /// assert_eq!(
    ///     policy.backoff_schedule(),
    ///     vec![
    ///         Duration::from_millis(100),
    ///         Duration::from_millis(200),
    ///         Duration::from_millis(300),
    ///     ]
    /// );
    /// ```
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut schedule = Vec::new();
        let mut backoff = self.initial_backoff;
        for _ in 1..self.max_attempts {
            schedule.push(backoff.min(self.max_backoff));
            backoff = backoff.mul_f64(self.multiplier).min(self.max_backoff);
        }
        schedule
    }

    /// Run `f` until it succeeds, fails permanently, or the budget runs out
    pub async fn run<F, Fut, T, E>(&self, operation: &str, f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        self.attempt(operation, f, true).await
    }

    /// Like [`RetryPolicy::run`], for futures that keep working after being
    /// dropped, such as [`run_blocking`]
    ///
    /// A timed-out call may still be running on the blocking pool, so it is
    /// never started again; at most one call is in flight at a time.
    pub async fn run_detached<F, Fut, T, E>(&self, operation: &str, f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        self.attempt(operation, f, false).await
    }

    async fn attempt<F, Fut, T, E>(
        &self,
        operation: &str,
        mut f: F,
        retry_timeouts: bool,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let schedule = self.backoff_schedule();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let failure = match timeout(self.attempt_timeout, f()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        info!(operation, attempts = attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Ok(Err(error)) => {
                    if !error.is_transient() {
                        return Err(RetryError::Permanent {
                            operation: operation.to_string(),
                            attempts: attempt,
                            error,
                        });
                    }
                    warn!(operation, attempt, max_attempts = self.max_attempts, error = %error, "Operation failed");
                    RetryError::Exhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        error,
                    }
                }
                Err(_) => {
                    warn!(operation, attempt, max_attempts = self.max_attempts, timeout = ?self.attempt_timeout, "Operation timed out");
                    let failure = RetryError::TimedOut {
                        operation: operation.to_string(),
                        attempts: attempt,
                        timeout: self.attempt_timeout,
                    };
                    if !retry_timeouts {
                        return Err(failure);
                    }
                    failure
                }
            };

            if attempt >= self.max_attempts {
                warn!(operation, attempts = attempt, "Operation failed after max retries");
                return Err(failure);
            }

            let backoff = schedule
                .get(attempt as usize - 1)
                .copied()
                .unwrap_or(self.max_backoff);
            sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Flaky(bool);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            attempts,
            Duration::from_millis(1),
            Duration::from_millis(4),
            2.0,
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let policy = RetryPolicy::new(
            6,
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
            Duration::from_secs(1),
        );
        let ms: Vec<u128> = policy.backoff_schedule().iter().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![100, 200, 400, 500, 500]);
        assert!(RetryPolicy::no_retry(Duration::from_secs(1)).backoff_schedule().is_empty());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = fast_policy(5)
            .run("op", || {
                let c = Arc::clone(&c);
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(Flaky(true))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = fast_policy(5)
            .run("op", || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(false)) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Permanent { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let result: Result<(), _> = fast_policy(3).run("op", || async { Err(Flaky(true)) }).await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let policy = RetryPolicy::new(
            2,
            Duration::from_millis(1),
            Duration::from_millis(1),
            1.0,
            Duration::from_millis(10),
        );
        let result: Result<(), RetryError<Flaky>> = policy
            .run("slow", || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(RetryError::TimedOut { attempts: 2, .. })));
    }

    #[tokio::test]
    async fn test_detached_timeout_is_not_retried() {
        let policy = RetryPolicy::new(
            3,
            Duration::from_millis(1),
            Duration::from_millis(1),
            1.0,
            Duration::from_millis(20),
        );
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), RetryError<BlockingError<Flaky>>> = policy
            .run_detached("slow", || {
                c.fetch_add(1, Ordering::SeqCst);
                run_blocking(|| {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(())
                })
            })
            .await;
        assert!(matches!(result, Err(RetryError::TimedOut { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detached_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<u32, RetryError<BlockingError<Flaky>>> = fast_policy(3)
            .run_detached("op", || {
                let c = Arc::clone(&c);
                run_blocking(move || {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 2 {
                        Err(Flaky(true))
                    } else {
                        Ok(n)
                    }
                })
            })
            .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_run_blocking_maps_errors() {
        let ok: Result<u8, BlockingError<Flaky>> = run_blocking(|| Ok(7)).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, BlockingError<Flaky>> = run_blocking(|| Err(Flaky(true))).await;
        assert!(err.unwrap_err().is_transient());
    }
}
