//! Guarded execution
//!
//! Per attempt:
//!
//! ```text
//! circuit breaker admission ── rejected ──▶ CircuitOpen
//!     │
//! operation ── Ok ──▶ abortWhen / abortIf ── match ──▶ Aborted
//!     │                    │
//!     │                    └──▶ breaker success ──▶ Ok(result)
//!     │
//!     └── Err ──▶ nested abort / abortOn ── match ──▶ Aborted
//!                    │
//!                    └──▶ breaker failure ──▶ on_failed_attempt
//!                             │
//!                  retry? ── yes ──▶ on_retry ──▶ sleep ──▶ next attempt
//!                             │
//!                             └── no ──▶ fallback ──▶ Ok / Fallback
//!                                   (or Exhausted without fallback)
//! ```

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{AbortReason, GuardianError, GuardianResult};
use crate::kind::{Classify, FailureKinds};
use crate::retry::{RetryAttemptContext, RetryPolicy};

use super::builder::GuardianBuilder;

/// Fallback invoked once the operation has failed for good
pub type FallbackFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Predicate over a successful result
pub type ResultPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

pub(crate) struct AbortWhen<T> {
    pub(crate) sentinel: bool,
    pub(crate) check: ResultPredicate<T>,
}

impl<T> Clone for AbortWhen<T> {
    fn clone(&self) -> Self {
        Self {
            sentinel: self.sentinel,
            check: Arc::clone(&self.check),
        }
    }
}

/// Immutable execution configuration wrapping fallible operations
///
/// Cheap to clone; policies, breaker and callbacks are shared.
///
/// # Example
///
/// ```rust,no_run
/// use guardian::retry::{BackoffStrategy, RetryPolicy};
/// use guardian::{CircuitBreaker, FailureKind, Guardian};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(2))?);
///
///     let guardian = Guardian::builder()
///         .retry_policy(
///             RetryPolicy::new(3, Duration::from_millis(500))
///                 .with_backoff(BackoffStrategy::Exponential, 2.0)?
///                 .retry_on(FailureKind::IO),
///         )
///         .circuit_breaker(breaker)
///         .fallback(|| async { Ok("cached".to_string()) })
///         .abort_on(FailureKind::IO_NOT_FOUND)
///         .build();
///
///     let body = guardian
///         .execute(|| async { std::fs::read_to_string("/etc/hostname") })
///         .await?;
///     println!("{}", body);
///     Ok(())
/// }
/// ```
pub struct Guardian<T, E> {
    pub(crate) name: String,
    pub(crate) retry_policy: Option<Arc<RetryPolicy>>,
    pub(crate) circuit_breaker: Option<Arc<CircuitBreaker>>,
    pub(crate) fallback: Option<FallbackFn<T, E>>,
    pub(crate) abort_on: FailureKinds,
    pub(crate) abort_when: Option<AbortWhen<T>>,
    pub(crate) abort_if: Option<ResultPredicate<T>>,
}

impl<T, E> Guardian<T, E> {
    pub fn builder() -> GuardianBuilder<T, E> {
        GuardianBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn retry_policy(&self) -> Option<&Arc<RetryPolicy>> {
        self.retry_policy.as_ref()
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn abort_on_failures(&self) -> &FailureKinds {
        &self.abort_on
    }

    fn result_abort(&self, result: &T) -> Option<AbortReason> {
        if let Some(when) = &self.abort_when {
            if (when.check)(result) {
                return Some(AbortReason::ResultEquals(when.sentinel));
            }
        }
        if let Some(predicate) = &self.abort_if {
            if predicate(result) {
                return Some(AbortReason::ResultPredicate);
            }
        }
        None
    }
}

impl<T, E> Guardian<T, E>
where
    E: Error + Classify + 'static,
{
    /// Execute `op` under this configuration
    ///
    /// `op` is invoked once per attempt. Retry delays suspend the calling
    /// task; dropping the returned future abandons the execution.
    pub async fn execute<F, Fut>(&self, op: F) -> GuardianResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(op, None).await
    }

    /// Execute `op`, giving up with [`GuardianError::Cancelled`] if `token` is
    /// cancelled while waiting to retry
    ///
    /// The fallback is never invoked for a cancelled execution.
    pub async fn execute_with_cancellation<F, Fut>(
        &self,
        op: F,
        token: &CancellationToken,
    ) -> GuardianResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(op, Some(token)).await
    }

    async fn run<F, Fut>(&self, mut op: F, cancel: Option<&CancellationToken>) -> GuardianResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;
        let mut last_failure: Option<E> = None;

        loop {
            if let Some(breaker) = &self.circuit_breaker {
                if let Err(rejection) = breaker.before_call() {
                    warn!(
                        operation = %self.name,
                        attempts = attempts,
                        error = %rejection,
                        "call rejected by circuit breaker"
                    );
                    return Err(GuardianError::CircuitOpen {
                        attempts,
                        rejection,
                        last_failure,
                    });
                }
            }

            debug!(operation = %self.name, attempt = attempts + 1, "starting attempt");
            let outcome = op().await;
            attempts += 1;

            let failure = match outcome {
                Ok(result) => {
                    if let Some(reason) = self.result_abort(&result) {
                        warn!(operation = %self.name, attempt = attempts, reason = %reason, "execution aborted");
                        return Err(GuardianError::Aborted {
                            reason,
                            attempts,
                            cause: None,
                        });
                    }
                    if let Some(breaker) = &self.circuit_breaker {
                        breaker.after_call_success();
                    }
                    self.log_success(attempts, start.elapsed());
                    return Ok(result);
                }
                Err(failure) => failure,
            };

            if failure.is_abort() {
                return Err(GuardianError::Aborted {
                    reason: AbortReason::Nested,
                    attempts,
                    cause: Some(failure),
                });
            }
            if let Some(kind) = self.abort_on.matching(&failure) {
                let reason = AbortReason::FailureKind(kind.clone());
                warn!(operation = %self.name, attempt = attempts, reason = %reason, "execution aborted");
                return Err(GuardianError::Aborted {
                    reason,
                    attempts,
                    cause: Some(failure),
                });
            }

            // Reported regardless of whether the retry policy will accept it
            if let Some(breaker) = &self.circuit_breaker {
                breaker.after_call_failure(&failure);
            }

            let (can_retry, delay) = self.notify_failed_attempt(attempts, &failure);

            if !can_retry {
                return self.finish(attempts, failure).await;
            }

            if !delay.is_zero() {
                match cancel {
                    Some(token) => {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => {
                                return Err(self.cancelled(attempts, failure));
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }
            } else if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(self.cancelled(attempts, failure));
            }

            last_failure = Some(failure);
        }
    }

    /// Run the attempt listeners; returns the retry decision and next delay
    fn notify_failed_attempt(&self, attempt: u32, failure: &E) -> (bool, Duration) {
        let Some(policy) = &self.retry_policy else {
            return (false, Duration::ZERO);
        };

        let can_retry = policy.should_retry(attempt, failure);
        let delay = policy.compute_delay(attempt);
        let kind = Classify::kind(failure);
        let context = RetryAttemptContext::new(attempt, failure, &kind, delay);

        for listener in policy.failed_attempt_listeners() {
            listener(&context);
        }

        if can_retry {
            warn!(
                operation = %self.name,
                attempt = attempt,
                error = %failure,
                delay_ms = as_millis(delay),
                "attempt failed, will retry"
            );
            for listener in policy.retry_listeners() {
                listener(&context);
            }
        }

        (can_retry, delay)
    }

    async fn finish(&self, attempts: u32, failure: E) -> GuardianResult<T, E> {
        let Some(fallback) = &self.fallback else {
            error!(
                operation = %self.name,
                attempts = attempts,
                error = %failure,
                "all attempts failed"
            );
            return Err(GuardianError::Exhausted {
                attempts,
                source: failure,
            });
        };

        info!(
            operation = %self.name,
            attempts = attempts,
            error = %failure,
            "operation failed, executing fallback"
        );
        match fallback().await {
            Ok(result) => Ok(result),
            Err(fallback_failure) => {
                error!(
                    operation = %self.name,
                    error = %fallback_failure,
                    "fallback failed"
                );
                Err(GuardianError::Fallback {
                    attempts,
                    source: fallback_failure,
                    last_failure: failure,
                })
            }
        }
    }

    fn cancelled(&self, attempts: u32, failure: E) -> GuardianError<E> {
        warn!(operation = %self.name, attempts = attempts, "execution cancelled");
        GuardianError::Cancelled {
            attempts,
            last_failure: failure,
        }
    }

    fn log_success(&self, attempts: u32, elapsed: Duration) {
        if attempts > 1 {
            info!(
                operation = %self.name,
                attempt = attempts,
                total_duration_ms = as_millis(elapsed),
                "succeeded after retry"
            );
        } else {
            debug!(
                operation = %self.name,
                duration_ms = as_millis(elapsed),
                "succeeded on first attempt"
            );
        }
    }
}

/// Milliseconds for log fields, saturating instead of truncating
pub(super) fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<T, E> Clone for Guardian<T, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            retry_policy: self.retry_policy.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
            fallback: self.fallback.clone(),
            abort_on: self.abort_on.clone(),
            abort_when: self.abort_when.clone(),
            abort_if: self.abort_if.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Guardian<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guardian")
            .field("name", &self.name)
            .field("retry_policy", &self.retry_policy)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("fallback", &self.fallback.is_some())
            .field("abort_on", &self.abort_on)
            .field("abort_when", &self.abort_when.as_ref().map(|when| when.sentinel))
            .field("abort_if", &self.abort_if.is_some())
            .finish()
    }
}
