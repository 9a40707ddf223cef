//! Execution engine
//!
//! [`Guardian`] composes an operation with an optional retry policy, circuit
//! breaker, fallback and abort conditions, and runs it under one protocol.
//! Abort conditions are hard stops: they bypass retries, breaker bookkeeping
//! and the fallback.

mod builder;
mod executor;

pub use builder::GuardianBuilder;
pub use executor::{FallbackFn, Guardian, ResultPredicate};
