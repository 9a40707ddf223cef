//! Circuit breaker
//!
//! A process-local, three-state breaker shared by every caller of one
//! downstream dependency. The execution engine calls
//! [`CircuitBreaker::before_call`] before each attempt and reports the
//! outcome with [`CircuitBreaker::after_call_success`] or
//! [`CircuitBreaker::after_call_failure`].

mod builder;
mod event;
mod state;

pub use builder::CircuitBreakerBuilder;
pub use event::{BreakerListener, CircuitBreakerEvent, CircuitState, ListenerCounts};
pub use state::CircuitBreaker;
