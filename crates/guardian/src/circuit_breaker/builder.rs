//! Circuit breaker builder

use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::kind::{FailureKind, FailureKinds};

use super::event::{BreakerListener, CircuitBreakerEvent};
use super::state::{CircuitBreaker, Settings};

const DEFAULT_NAME: &str = "circuit-breaker";

/// Builder for a [`CircuitBreaker`]
///
/// `failure_threshold` and `reset_timeout` are required and must be non-zero.
#[derive(Default)]
pub struct CircuitBreakerBuilder {
    name: Option<String>,
    failure_threshold: Option<u32>,
    reset_timeout: Option<Duration>,
    handled: FailureKinds,
    on_open: Vec<BreakerListener>,
    on_close: Vec<BreakerListener>,
    on_half_open: Vec<BreakerListener>,
}

impl CircuitBreakerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in logs and events
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Consecutive handled failures that open the breaker
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Time after the last failure before a trial call is admitted
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = Some(timeout);
        self
    }

    /// Only count failures satisfying `kind` (or any other handled kind)
    pub fn handle(mut self, kind: impl Into<FailureKind>) -> Self {
        self.handled.insert(kind);
        self
    }

    pub fn on_open<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CircuitBreakerEvent<'_>) + Send + Sync + 'static,
    {
        self.on_open.push(Arc::new(listener));
        self
    }

    pub fn on_close<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CircuitBreakerEvent<'_>) + Send + Sync + 'static,
    {
        self.on_close.push(Arc::new(listener));
        self
    }

    pub fn on_half_open<F>(mut self, listener: F) -> Self
    where
        F: Fn(&CircuitBreakerEvent<'_>) + Send + Sync + 'static,
    {
        self.on_half_open.push(Arc::new(listener));
        self
    }

    /// Validate and build the breaker
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        let failure_threshold = match self.failure_threshold {
            Some(threshold) if threshold > 0 => threshold,
            _ => {
                return Err(ConfigError::invalid_argument(
                    "failure_threshold",
                    "must be set and greater than zero",
                ))
            }
        };
        let reset_timeout = match self.reset_timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => {
                return Err(ConfigError::invalid_argument(
                    "reset_timeout",
                    "must be set and greater than zero",
                ))
            }
        };

        Ok(CircuitBreaker::from_settings(Settings {
            name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            failure_threshold,
            reset_timeout,
            handled: self.handled,
            on_open: self.on_open,
            on_close: self.on_close,
            on_half_open: self.on_half_open,
        }))
    }
}
