//! Retry policy for transport calls.

use ipfetch_core::FetchError;
use rand::Rng;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Statuses retried unless configured otherwise.
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Classification of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Done; return to the caller.
    Success,
    /// Try again, after `retry_after` if the server asked for it.
    Retryable { retry_after: Option<Duration> },
    /// Never retried.
    Terminal,
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling for the computed (not server-requested) delay.
    pub max_backoff: Duration,
    /// Total time budget across all attempts and delays.
    pub max_elapsed: Duration,
    /// Upper bound of the random delay added to each computed backoff.
    pub jitter: Duration,
    /// Response statuses that trigger a retry.
    pub retry_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(20),
            max_elapsed: Duration::from_secs(120),
            jitter: Duration::from_secs(1),
            retry_statuses: DEFAULT_RETRY_STATUSES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self::new(1)
    }

    /// Set exponential backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set the jitter bound; `Duration::ZERO` makes delays deterministic.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the total time budget.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Set retryable statuses.
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }

    /// Classify a failed attempt.
    pub fn classify_error(&self, error: &FetchError) -> Outcome {
        match error {
            FetchError::Transport(_) | FetchError::Timeout(_) => Outcome::Retryable { retry_after: None },
            FetchError::Validation(_) | FetchError::MalformedResponse(_) | FetchError::Internal(_) => {
                Outcome::Terminal
            }
            other => match other.status() {
                Some(status) if self.retry_statuses.contains(&status) => Outcome::Retryable {
                    retry_after: other.retry_after(),
                },
                _ => Outcome::Terminal,
            },
        }
    }

    /// Classify an attempt result.
    pub fn classify<T>(&self, result: &Result<T, FetchError>) -> Outcome {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) => self.classify_error(e),
        }
    }

    /// Computed backoff before retry number `retry` (1-based), without jitter.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Delay before retry number `retry`.
    ///
    /// A server-supplied `retry_after` replaces the computed curve entirely.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(delay) = retry_after {
            return delay;
        }
        let base = self.backoff_for(retry);
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    /// Run `operation` until it succeeds, fails terminally, or the budget runs out.
    ///
    /// `operation` receives the 1-based attempt number. `on_retry` is called
    /// with the upcoming attempt number, its delay, and the error that caused it.
    pub async fn execute<T, F, Fut, R>(&self, mut operation: F, mut on_retry: R) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
        R: FnMut(u32, Duration, &FetchError),
    {
        let started = Instant::now();
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = operation(attempt).await;
            let retry_after = match self.classify(&result) {
                Outcome::Success | Outcome::Terminal => return result,
                Outcome::Retryable { retry_after } => retry_after,
            };
            let Err(error) = result else {
                return result;
            };

            if attempt >= max_attempts {
                tracing::warn!(target: "ipfetch", attempts = attempt, error = %error, "retry budget exhausted");
                return Err(error);
            }

            let delay = self.delay_for(attempt, retry_after);
            if started.elapsed() + delay > self.max_elapsed {
                tracing::warn!(
                    target: "ipfetch",
                    attempts = attempt,
                    elapsed_ms = started.elapsed().as_millis(),
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retry time budget exhausted"
                );
                return Err(error);
            }

            attempt += 1;
            tracing::warn!(
                target: "ipfetch",
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "retrying request"
            );
            on_retry(attempt, delay, &error);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn deterministic() -> RetryPolicy {
        RetryPolicy::default().with_jitter(Duration::ZERO)
    }

    fn server(status: u16) -> FetchError {
        FetchError::Server {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_classification() {
        let policy = RetryPolicy::default();
        let retryable = Outcome::Retryable { retry_after: None };

        assert_eq!(policy.classify::<()>(&Ok(())), Outcome::Success);
        assert_eq!(policy.classify_error(&FetchError::Transport("reset".into())), retryable);
        assert_eq!(policy.classify_error(&FetchError::Timeout("30s".into())), retryable);
        assert_eq!(policy.classify_error(&server(503)), retryable);
        assert_eq!(policy.classify_error(&server(501)), Outcome::Terminal);
        assert_eq!(policy.classify_error(&FetchError::Authentication { status: 401 }), Outcome::Terminal);
        assert_eq!(policy.classify_error(&FetchError::Validation("x".into())), Outcome::Terminal);
        assert_eq!(
            policy.classify_error(&FetchError::MalformedResponse("x".into())),
            Outcome::Terminal
        );
        assert_eq!(
            policy.classify_error(&FetchError::RateLimitExceeded {
                retry_after: Some(Duration::from_secs(2))
            }),
            Outcome::Retryable {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[test]
    fn test_custom_statuses() {
        let policy = RetryPolicy::default().with_statuses([503]);
        assert_eq!(policy.classify_error(&server(500)), Outcome::Terminal);
        assert_eq!(
            policy.classify_error(&FetchError::RateLimitExceeded { retry_after: None }),
            Outcome::Terminal
        );
    }

    #[test]
    fn test_backoff_curve() {
        let policy = deterministic();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(20));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(20));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for(1, None);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_retry_after_overrides_curve() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = deterministic()
            .execute(
                move |_| {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(FetchError::Transport("connection reset".into()))
                        } else {
                            Ok("payload")
                        }
                    }
                },
                |_, _, _| {},
            )
            .await;

        assert_eq!(result, Ok("payload"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_surfaces_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = deterministic()
            .execute(
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(server(502)) }
                },
                |_, _, _| {},
            )
            .await;

        assert_eq!(result, Err(server(502)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = deterministic()
            .execute(
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(FetchError::NotFound { url: "u".into() }) }
                },
                |_, _, _| {},
            )
            .await;

        assert!(matches!(result, Err(FetchError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_schedules_next_attempt() {
        let started = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let times = seen.clone();
        let result = deterministic()
            .execute(
                move |attempt| {
                    times.lock().unwrap().push(started.elapsed());
                    async move {
                        if attempt == 1 {
                            Err(FetchError::RateLimitExceeded {
                                retry_after: Some(Duration::from_secs(2)),
                            })
                        } else {
                            Ok(())
                        }
                    }
                },
                |_, _, _| {},
            )
            .await;

        assert!(result.is_ok());
        let times = seen.lock().unwrap().clone();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_elapsed_stops_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = deterministic().with_max_elapsed(Duration::from_secs(5));
        let result: Result<(), _> = policy
            .execute(
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err(FetchError::RateLimitExceeded {
                            retry_after: Some(Duration::from_secs(60)),
                        })
                    }
                },
                |_, _, _| {},
            )
            .await;

        assert!(matches!(result, Err(FetchError::RateLimitExceeded { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_reports_attempts() {
        let mut reported = Vec::new();
        let _: Result<(), _> = deterministic()
            .execute(|_| async { Err(FetchError::Timeout("t".into())) }, |attempt, delay, _| {
                reported.push((attempt, delay));
            })
            .await;

        assert_eq!(
            reported,
            vec![
                (2, Duration::from_secs(1)),
                (3, Duration::from_secs(2)),
                (4, Duration::from_secs(4)),
            ]
        );
    }
}
