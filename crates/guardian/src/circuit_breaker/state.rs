//! Circuit breaker state machine
//!
//! ```text
//! Closed   → Open:     failure_count reaches failure_threshold
//! Open     → HalfOpen: admission after reset_timeout since the last failure
//! HalfOpen → Closed:   the trial call succeeds
//! HalfOpen → Open:     the trial call fails
//! ```
//!
//! All mutation happens under one mutex, so concurrent callers observe a
//! single sequence of transitions. Listeners fire after the lock is
//! released, in registration order, and may call back into the breaker.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{CircuitOpenError, ConfigError};
use crate::kind::{Classify, FailureKinds};

use super::builder::CircuitBreakerBuilder;
use super::event::{BreakerListener, CircuitBreakerEvent, CircuitState, ListenerCounts};

/// Configuration shared between a breaker and its fresh-state clones
pub(crate) struct Settings {
    pub(crate) name: String,
    pub(crate) failure_threshold: u32,
    pub(crate) reset_timeout: Duration,
    pub(crate) handled: FailureKinds,
    pub(crate) on_open: Vec<BreakerListener>,
    pub(crate) on_close: Vec<BreakerListener>,
    pub(crate) on_half_open: Vec<BreakerListener>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// State change recorded under the lock, announced after it is released
#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    failure_count: u32,
}

impl Inner {
    fn fresh() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
        }
    }
}

/// Thread-safe circuit breaker
///
/// Share one instance (behind an `Arc`) between every call site guarding the
/// same dependency.
///
/// # Example
///
/// ```rust
/// use guardian::{CircuitBreaker, CircuitState, FailureKind};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::builder()
///     .name("inventory")
///     .failure_threshold(3)
///     .reset_timeout(Duration::from_secs(2))
///     .handle(FailureKind::IO)
///     .on_open(|event| eprintln!("{} opened", event.name()))
///     .build()
///     .unwrap();
///
/// assert_eq!(breaker.state(), CircuitState::Closed);
/// ```
pub struct CircuitBreaker {
    settings: Arc<Settings>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker with no handled-kind filter and no listeners
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Result<Self, ConfigError> {
        Self::builder()
            .failure_threshold(failure_threshold)
            .reset_timeout(reset_timeout)
            .build()
    }

    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    pub(crate) fn from_settings(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            inner: Mutex::new(Inner::fresh()),
        }
    }

    /// A new breaker with this one's configuration and listeners, in the
    /// closed state with no recorded failures
    pub fn clone_with_fresh_state(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            inner: Mutex::new(Inner::fresh()),
        }
    }

    /// Admission check before invoking the guarded operation
    ///
    /// Rejects while open and the reset timeout has not elapsed since the
    /// last counted failure. Once it has, the call is admitted as a trial
    /// and the breaker moves to half-open.
    pub fn before_call(&self) -> Result<(), CircuitOpenError> {
        let transition = {
            let mut inner = self.lock();
            if inner.state != CircuitState::Open {
                return Ok(());
            }

            let elapsed = inner
                .last_failure_time
                .map(|at| Instant::now().saturating_duration_since(at))
                .unwrap_or(Duration::MAX);

            if elapsed <= self.settings.reset_timeout {
                return Err(CircuitOpenError {
                    name: self.settings.name.clone(),
                    retry_after: self.settings.reset_timeout - elapsed,
                });
            }
            self.transition(&mut inner, CircuitState::HalfOpen)
        };

        self.notify(Some(transition));
        Ok(())
    }

    /// Report a successful call
    pub fn after_call_success(&self) {
        let transition = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::HalfOpen => self.close(&mut inner),
                CircuitState::Closed => {
                    inner.failure_count = 0;
                    None
                }
                // Success only follows an admitted call
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    /// Report a failed call
    ///
    /// Failures whose kind matches none of the handled kinds are ignored when
    /// a handled set is configured.
    pub fn after_call_failure<F: Classify + ?Sized>(&self, failure: &F) {
        if !self.settings.handled.is_empty() && !self.settings.handled.matches(failure) {
            return;
        }

        let transition = {
            let mut inner = self.lock();
            inner.failure_count = inner.failure_count.saturating_add(1);
            inner.last_failure_time = Some(Instant::now());

            let should_open = match inner.state {
                CircuitState::Closed => inner.failure_count >= self.settings.failure_threshold,
                CircuitState::HalfOpen => true,
                CircuitState::Open => false,
            };
            should_open.then(|| self.transition(&mut inner, CircuitState::Open))
        };
        self.notify(transition);
    }

    /// Force the breaker closed and clear the failure count
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.lock();
            self.close(&mut inner)
        };
        self.notify(transition);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Time of the most recent counted failure, `None` if there has been none
    pub fn last_failure_time(&self) -> Option<Instant> {
        self.lock().last_failure_time
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn failure_threshold(&self) -> u32 {
        self.settings.failure_threshold
    }

    pub fn reset_timeout(&self) -> Duration {
        self.settings.reset_timeout
    }

    pub fn handled_failures(&self) -> &FailureKinds {
        &self.settings.handled
    }

    pub fn listener_counts(&self) -> ListenerCounts {
        ListenerCounts {
            on_open: self.settings.on_open.len(),
            on_close: self.settings.on_close.len(),
            on_half_open: self.settings.on_half_open.len(),
        }
    }

    /// Whether both breakers were derived from the same configuration
    pub fn shares_configuration_with(&self, other: &CircuitBreaker) -> bool {
        Arc::ptr_eq(&self.settings, &other.settings)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner is only ever written whole-field, so a poisoned lock is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self, inner: &mut Inner) -> Option<Transition> {
        inner.failure_count = 0;
        (inner.state != CircuitState::Closed).then(|| self.transition(inner, CircuitState::Closed))
    }

    /// Apply a state change under the lock; listeners are notified later
    fn transition(&self, inner: &mut Inner, to: CircuitState) -> Transition {
        let from = inner.state;
        inner.state = to;

        match to {
            CircuitState::Open => warn!(
                breaker = %self.settings.name,
                failure_count = inner.failure_count,
                from = %from,
                "circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                breaker = %self.settings.name,
                "circuit breaker half-open, admitting trial call"
            ),
            CircuitState::Closed => info!(breaker = %self.settings.name, "circuit breaker closed"),
        }

        Transition {
            from,
            to,
            failure_count: inner.failure_count,
        }
    }

    /// Run the listeners for `transition`; must be called without the lock held
    fn notify(&self, transition: Option<Transition>) {
        let Some(Transition {
            from,
            to,
            failure_count,
        }) = transition
        else {
            return;
        };

        let listeners = match to {
            CircuitState::Open => &self.settings.on_open,
            CircuitState::HalfOpen => &self.settings.on_half_open,
            CircuitState::Closed => &self.settings.on_close,
        };
        let event = CircuitBreakerEvent::new(&self.settings.name, from, to, failure_count);
        for listener in listeners {
            listener(&event);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.settings.name)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .field("failure_threshold", &self.settings.failure_threshold)
            .field("reset_timeout", &self.settings.reset_timeout)
            .field("handled", &self.settings.handled)
            .finish()
    }
}
