//! Circuit breaker states and transition events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected until the reset timeout elapses
    Open,
    /// A trial call has been admitted
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Snapshot of a state transition, passed to breaker listeners
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerEvent<'a> {
    name: &'a str,
    from: CircuitState,
    to: CircuitState,
    failure_count: u32,
}

impl<'a> CircuitBreakerEvent<'a> {
    pub(crate) fn new(name: &'a str, from: CircuitState, to: CircuitState, failure_count: u32) -> Self {
        Self {
            name,
            from,
            to,
            failure_count,
        }
    }

    /// Name of the breaker that transitioned
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn from(&self) -> CircuitState {
        self.from
    }

    pub fn to(&self) -> CircuitState {
        self.to
    }

    /// Failure count after the transition
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

/// Callback invoked on a breaker transition
///
/// Listeners run on the calling thread after the breaker's lock is released,
/// so they may query or reset the breaker that fired them. Transitions made
/// concurrently by other callers can be announced in either order.
pub type BreakerListener = Arc<dyn Fn(&CircuitBreakerEvent<'_>) + Send + Sync>;

/// Number of listeners registered per transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerCounts {
    pub on_open: usize,
    pub on_close: usize,
    pub on_half_open: usize,
}
