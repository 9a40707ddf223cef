//! Retry policies and backoff
//!
//! # Features
//!
//! - Attempt counting: `max_retries` retries after the initial attempt
//! - Failure filtering by kind, with "retry on anything" as the default
//! - Simple and exponential backoff, optional cap and jitter
//! - Ordered attempt listeners (`on_failed_attempt`, `on_retry`)
//!
//! # Example
//!
//! ```rust
//! use guardian::retry::{BackoffStrategy, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(100))
//!     .with_backoff(BackoffStrategy::Exponential, 2.0)
//!     .unwrap();
//!
//! assert_eq!(policy.compute_delay(3), Duration::from_millis(400));
//! ```

mod backoff;
mod policy;

pub use backoff::{calculate_delay, BackoffStrategy};
pub use policy::{AttemptListener, RetryAttemptContext, RetryPolicy};
