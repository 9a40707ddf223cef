//! Error types for guarded execution
//!
//! [`GuardianError`] is what a guarded call returns when it does not produce a
//! value. Every variant is an execution failure; aborted and fallback
//! failures are the two refinements callers usually branch on.
//! [`ConfigError`] is only ever returned while assembling policies.

use std::fmt;

use thiserror::Error;

use crate::kind::{Classify, FailureKind};

/// Result of a guarded execution
pub type GuardianResult<T, E> = std::result::Result<T, GuardianError<E>>;

/// Why an execution was aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A boolean result equalled the configured sentinel
    ResultEquals(bool),
    /// The result predicate matched
    ResultPredicate,
    /// The operation failed with a kind configured to abort
    FailureKind(FailureKind),
    /// A nested guarded call was aborted
    Nested,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ResultEquals(value) => {
                write!(f, "aborted due to abortWhen condition with result: {}", value)
            }
            AbortReason::ResultPredicate => write!(f, "aborted due to abortIf condition"),
            AbortReason::FailureKind(kind) => {
                write!(f, "aborted due to abortOn failure kind: {}", kind)
            }
            AbortReason::Nested => write!(f, "aborted by a nested guarded execution"),
        }
    }
}

/// Failure of a guarded execution
///
/// Generic over `E`, the error type of the guarded operation.
#[derive(Debug, Error)]
pub enum GuardianError<E> {
    /// Retries were exhausted (or none were configured) and no fallback was set
    #[error("operation failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Number of attempts made
        attempts: u32,
        /// Failure of the final attempt
        #[source]
        source: E,
    },

    /// The circuit breaker rejected the call
    #[error("circuit breaker is open; operation not permitted after {attempts} attempt(s)")]
    CircuitOpen {
        attempts: u32,
        /// The breaker's rejection, including how long until it admits a trial
        #[source]
        rejection: CircuitOpenError,
        /// Failure of the last admitted attempt, if one was made
        last_failure: Option<E>,
    },

    /// An abort condition fired; never retried and never falls back
    #[error("{reason}")]
    Aborted {
        reason: AbortReason,
        attempts: u32,
        /// The failure that triggered the abort, for failure-kind and nested aborts
        cause: Option<E>,
    },

    /// The fallback failed after the operation exhausted its retries
    #[error("fallback execution failed after operation failure: {last_failure}")]
    Fallback {
        attempts: u32,
        /// Failure of the fallback itself
        #[source]
        source: E,
        /// Failure of the operation's final attempt
        last_failure: E,
    },

    /// The call was cancelled while waiting to retry
    #[error("execution cancelled after {attempts} attempt(s): {last_failure}")]
    Cancelled { attempts: u32, last_failure: E },
}

impl<E> GuardianError<E> {
    /// Number of operation attempts made before this failure
    pub fn attempts(&self) -> u32 {
        match self {
            GuardianError::Exhausted { attempts, .. }
            | GuardianError::CircuitOpen { attempts, .. }
            | GuardianError::Aborted { attempts, .. }
            | GuardianError::Fallback { attempts, .. }
            | GuardianError::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, GuardianError::Exhausted { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, GuardianError::CircuitOpen { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, GuardianError::Aborted { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, GuardianError::Fallback { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GuardianError::Cancelled { .. })
    }

    /// The abort reason, for aborted executions
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            GuardianError::Aborted { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// The last failure of the guarded operation, if any attempt failed
    pub fn last_failure(&self) -> Option<&E> {
        match self {
            GuardianError::Exhausted { source, .. } => Some(source),
            GuardianError::CircuitOpen { last_failure, .. } => last_failure.as_ref(),
            GuardianError::Aborted { cause, .. } => cause.as_ref(),
            GuardianError::Fallback { last_failure, .. } => Some(last_failure),
            GuardianError::Cancelled { last_failure, .. } => Some(last_failure),
        }
    }

    /// Consume the error, returning the last failure of the guarded operation
    pub fn into_last_failure(self) -> Option<E> {
        match self {
            GuardianError::Exhausted { source, .. } => Some(source),
            GuardianError::CircuitOpen { last_failure, .. } => last_failure,
            GuardianError::Aborted { cause, .. } => cause,
            GuardianError::Fallback { last_failure, .. } => Some(last_failure),
            GuardianError::Cancelled { last_failure, .. } => Some(last_failure),
        }
    }

    /// The breaker rejection, for circuit-open executions
    pub fn circuit_rejection(&self) -> Option<&CircuitOpenError> {
        match self {
            GuardianError::CircuitOpen { rejection, .. } => Some(rejection),
            _ => None,
        }
    }

    /// The fallback's own failure, for fallback executions
    pub fn fallback_failure(&self) -> Option<&E> {
        match self {
            GuardianError::Fallback { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl<E> Classify for GuardianError<E> {
    fn kind(&self) -> FailureKind {
        match self {
            GuardianError::Exhausted { .. } => FailureKind::EXHAUSTED,
            GuardianError::CircuitOpen { .. } => FailureKind::CIRCUIT_OPEN,
            GuardianError::Aborted { .. } => FailureKind::ABORTED,
            GuardianError::Fallback { .. } => FailureKind::FALLBACK,
            GuardianError::Cancelled { .. } => FailureKind::CANCELLED,
        }
    }

    fn satisfies(&self, kind: &FailureKind) -> bool {
        *kind == FailureKind::EXECUTION || self.kind() == *kind
    }

    fn is_abort(&self) -> bool {
        self.is_aborted()
    }
}

/// Admission rejected by an open circuit breaker
#[derive(Debug, Clone, Error)]
#[error("circuit breaker `{name}` is open; operation not permitted for another {retry_after:?}")]
pub struct CircuitOpenError {
    /// Name of the rejecting breaker
    pub name: String,
    /// Time left until a trial call will be admitted
    pub retry_after: std::time::Duration,
}

/// Errors raised while assembling policies or loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value is out of range
    #[error("invalid argument `{field}`: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    /// An environment override could not be parsed
    #[error("invalid environment override {var}: {message}")]
    InvalidEnv { var: String, message: String },

    /// Configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML for the schema
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ConfigError {
    /// Create an invalid argument error
    pub fn invalid_argument(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Create an invalid environment override error
    pub fn invalid_env(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnv {
            var: var.into(),
            message: message.into(),
        }
    }
}
