//! Bounded retry with linear backoff.
//!
//! Wraps a single provider call: on a retryable failure, wait
//! `base_delay * n` before attempt `n + 1`, for at most `attempts` extra
//! attempts. The final failure is returned unchanged.

use backon::{BackoffBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::config::duration_str;

/// How many times to re-attempt a call, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first call
    pub attempts: u32,

    #[serde(with = "duration_str")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// No re-attempts.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `operation`, re-running it while `retryable` approves the error
    /// and the attempt budget lasts.
    pub async fn run<T, E, F, Fut, R>(&self, operation: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        R: Fn(&E) -> bool,
    {
        operation
            .retry(LinearBuilder::from(*self))
            .when(|err: &E| retryable(err))
            .notify(|err: &E, delay: Duration| {
                tracing::debug!(error = %err, delay = ?delay, "Retrying after failure");
            })
            .await
    }
}

/// Backoff builder yielding `base, 2*base, 3*base, ...`.
#[derive(Debug, Clone, Copy)]
pub struct LinearBuilder {
    base: Duration,
    attempts: u32,
}

impl From<RetryPolicy> for LinearBuilder {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            base: policy.base_delay,
            attempts: policy.attempts,
        }
    }
}

impl BackoffBuilder for LinearBuilder {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff {
            base: self.base,
            attempts: self.attempts,
            issued: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    attempts: u32,
    issued: u32,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.issued >= self.attempts {
            return None;
        }
        self.issued += 1;
        Some(self.base * self.issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn failing_until(
        successes_after: u32,
        error: fn() -> TestError,
    ) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<u32, TestError>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n > successes_after { Ok(n) } else { Err(error()) })
        };
        (calls, op)
    }

    #[test]
    fn test_linear_backoff_sequence() {
        let delays: Vec<Duration> = LinearBuilder::from(RetryPolicy::new(3, Duration::from_millis(100)))
            .build()
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300)
            ]
        );
    }

    #[test]
    fn test_zero_attempts_yields_nothing() {
        assert_eq!(LinearBuilder::from(RetryPolicy::none()).build().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_retries_once() {
        let (calls, op) = failing_until(1, || TestError::Flaky);
        let result = RetryPolicy::default().run(op, |_| true).await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_propagates_after_budget() {
        let (calls, op) = failing_until(10, || TestError::Flaky);
        let result = RetryPolicy::new(2, Duration::from_millis(10))
            .run(op, |_| true)
            .await;

        assert_eq!(result, Err(TestError::Flaky));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let (calls, op) = failing_until(10, || TestError::Fatal);
        let result = RetryPolicy::new(3, Duration::from_millis(10))
            .run(op, |e| *e != TestError::Fatal)
            .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_are_linear() {
        let (_, op) = failing_until(3, || TestError::Flaky);
        let start = tokio::time::Instant::now();
        let result = RetryPolicy::new(3, Duration::from_millis(100))
            .run(op, |_| true)
            .await;

        assert_eq!(result, Ok(4));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(700), "elapsed {:?}", elapsed);
    }
}
