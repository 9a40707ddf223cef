//! # guardian
//!
//! Fault-tolerant execution of fallible async operations:
//! - Retry with simple or exponential backoff
//! - Circuit breaker shared across callers of one dependency
//! - Fallback once the operation has failed for good
//! - Abort conditions on results and failure kinds
//! - YAML configuration with environment overrides
//!
//! # Example
//!
//! ```rust,no_run
//! use guardian::retry::RetryPolicy;
//! use guardian::{CircuitBreaker, Guardian, GuardianError};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn fetch() -> Result<String, std::io::Error> {
//!     Ok("payload".to_string())
//! }
//!
//! async fn example() -> Result<(), GuardianError<std::io::Error>> {
//!     let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(2)).unwrap());
//!
//!     let body = Guardian::builder()
//!         .retry_policy(RetryPolicy::new(3, Duration::from_millis(200)))
//!         .circuit_breaker(breaker)
//!         .get(fetch)
//!         .await?;
//!     println!("{}", body);
//!     Ok(())
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod guardian;
pub mod kind;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerBuilder, CircuitState};
pub use config::GuardianConfig;
pub use error::{AbortReason, CircuitOpenError, ConfigError, GuardianError, GuardianResult};
pub use guardian::{Guardian, GuardianBuilder};
pub use kind::{Classify, FailureKind, FailureKinds};
