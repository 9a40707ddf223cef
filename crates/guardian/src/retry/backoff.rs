//! Retry delay strategies
//!
//! Delay arithmetic is done on nanoseconds in `f64` and truncated toward
//! zero, saturating at `Duration::MAX` instead of overflowing.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffStrategy {
    /// The base delay before every retry
    #[default]
    Simple,

    /// `base * multiplier^(attempt - 1)`
    Exponential,
}

/// Calculate the delay before retry number `attempt`
///
/// # Arguments
///
/// * `strategy` - Backoff strategy
/// * `base` - Delay before the first retry
/// * `multiplier` - Growth factor, only used by `Exponential`
/// * `attempt` - Retry number, 1 for the first retry
///
/// # Example
///
/// ```rust
/// use guardian::retry::{calculate_delay, BackoffStrategy};
/// use std::time::Duration;
///
/// let base = Duration::from_millis(500);
/// assert_eq!(calculate_delay(BackoffStrategy::Exponential, base, 2.0, 1), base);
/// assert_eq!(
///     calculate_delay(BackoffStrategy::Exponential, base, 2.0, 3),
///     Duration::from_millis(2000)
/// );
/// ```
pub fn calculate_delay(
    strategy: BackoffStrategy,
    base: Duration,
    multiplier: f64,
    attempt: u32,
) -> Duration {
    match strategy {
        BackoffStrategy::Simple => base,
        BackoffStrategy::Exponential => {
            let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
            scale(base, multiplier.powi(exponent))
        }
    }
}

/// Add up to 25% random extra delay
pub(crate) fn apply_jitter(delay: Duration) -> Duration {
    let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
    let range = nanos / 4;
    if range == 0 {
        return delay;
    }
    let extra = rand::thread_rng().gen_range(0..=range);
    delay.saturating_add(Duration::from_nanos(extra))
}

fn scale(base: Duration, factor: f64) -> Duration {
    let nanos = base.as_nanos() as f64 * factor;
    if nanos.is_nan() || nanos <= 0.0 {
        return Duration::ZERO;
    }
    if nanos >= u64::MAX as f64 {
        // Beyond ~584 years; clamp instead of overflowing
        return Duration::MAX;
    }
    Duration::from_nanos(nanos as u64)
}
