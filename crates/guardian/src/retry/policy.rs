//! Retry policy
//!
//! A [`RetryPolicy`] decides whether a failed attempt is retried and how long
//! to wait first. It carries no per-execution state, so one policy can guard
//! any number of concurrent executions.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::kind::{Classify, FailureKind, FailureKinds};

use super::backoff::{apply_jitter, calculate_delay, BackoffStrategy};

/// Callback invoked with the context of a failed attempt
pub type AttemptListener = Arc<dyn Fn(&RetryAttemptContext<'_>) + Send + Sync>;

/// Details of one failed attempt, passed to attempt listeners
#[derive(Clone, Copy)]
pub struct RetryAttemptContext<'a> {
    attempt_number: u32,
    last_failure: &'a (dyn Error + 'static),
    last_failure_kind: &'a FailureKind,
    delay: Duration,
}

impl<'a> RetryAttemptContext<'a> {
    pub(crate) fn new(
        attempt_number: u32,
        last_failure: &'a (dyn Error + 'static),
        last_failure_kind: &'a FailureKind,
        delay: Duration,
    ) -> Self {
        Self {
            attempt_number,
            last_failure,
            last_failure_kind,
            delay,
        }
    }

    /// Number of the attempt that failed (1-indexed)
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn last_failure(&self) -> &'a (dyn Error + 'static) {
        self.last_failure
    }

    pub fn last_failure_kind(&self) -> &'a FailureKind {
        self.last_failure_kind
    }

    /// Delay computed for the next attempt
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl fmt::Debug for RetryAttemptContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAttemptContext")
            .field("attempt_number", &self.attempt_number)
            .field("last_failure", &self.last_failure.to_string())
            .field("last_failure_kind", self.last_failure_kind)
            .field("delay", &self.delay)
            .finish()
    }
}

/// Retry configuration for a guarded execution
///
/// # Example
///
/// ```rust
/// use guardian::retry::{BackoffStrategy, RetryPolicy};
/// use guardian::FailureKind;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(500))
///     .with_backoff(BackoffStrategy::Exponential, 2.0)
///     .unwrap()
///     .retry_on(FailureKind::IO)
///     .on_retry(|ctx| println!("retrying in {:?}", ctx.delay()));
///
/// assert_eq!(policy.max_retries(), 3);
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    retry_on: FailureKinds,
    strategy: BackoffStrategy,
    multiplier: f64,
    max_delay: Option<Duration>,
    jitter: bool,
    on_failed_attempt: Vec<AttemptListener>,
    on_retry: Vec<AttemptListener>,
}

impl RetryPolicy {
    /// Create a policy allowing `max_retries` retries after the initial
    /// attempt, waiting `base_delay` before each, retrying on any failure
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            retry_on: FailureKinds::new(),
            strategy: BackoffStrategy::Simple,
            multiplier: 1.0,
            max_delay: None,
            jitter: false,
            on_failed_attempt: Vec::new(),
            on_retry: Vec::new(),
        }
    }

    /// Set the backoff strategy
    ///
    /// Fails when `multiplier` is below 1.0 or not a number.
    pub fn with_backoff(
        mut self,
        strategy: BackoffStrategy,
        multiplier: f64,
    ) -> Result<Self, ConfigError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::invalid_argument(
                "multiplier",
                format!("must be a finite number of at least 1.0, got {}", multiplier),
            ));
        }
        self.strategy = strategy;
        self.multiplier = multiplier;
        Ok(self)
    }

    /// Only retry failures satisfying `kind` (or any other registered kind)
    pub fn retry_on(mut self, kind: impl Into<FailureKind>) -> Self {
        self.retry_on.insert(kind);
        self
    }

    /// Cap every computed delay at `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Add up to 25% random extra to each delay
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Register a listener called after every failed attempt
    pub fn on_failed_attempt<F>(mut self, listener: F) -> Self
    where
        F: Fn(&RetryAttemptContext<'_>) + Send + Sync + 'static,
    {
        self.on_failed_attempt.push(Arc::new(listener));
        self
    }

    /// Register a listener called before waiting for a retry
    pub fn on_retry<F>(mut self, listener: F) -> Self
    where
        F: Fn(&RetryAttemptContext<'_>) + Send + Sync + 'static,
    {
        self.on_retry.push(Arc::new(listener));
        self
    }

    /// Whether the failure of attempt `attempt` (1-indexed) may be retried
    pub fn should_retry<F: Classify + ?Sized>(&self, attempt: u32, last_failure: &F) -> bool {
        if attempt > self.max_retries {
            return false;
        }
        self.retry_on.is_empty() || self.retry_on.matches(last_failure)
    }

    /// Delay before retry number `attempt` (1-indexed)
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let mut delay = calculate_delay(self.strategy, self.base_delay, self.multiplier, attempt);
        if let Some(cap) = self.max_delay {
            delay = delay.min(cap);
        }
        if self.jitter {
            delay = apply_jitter(delay);
        }
        delay
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn retryable_failures(&self) -> &FailureKinds {
        &self.retry_on
    }

    pub fn backoff_strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    pub(crate) fn failed_attempt_listeners(&self) -> &[AttemptListener] {
        &self.on_failed_attempt
    }

    pub(crate) fn retry_listeners(&self) -> &[AttemptListener] {
        &self.on_retry
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("retry_on", &self.retry_on)
            .field("strategy", &self.strategy)
            .field("multiplier", &self.multiplier)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("on_failed_attempt", &self.on_failed_attempt.len())
            .field("on_retry", &self.on_retry.len())
            .finish()
    }
}
