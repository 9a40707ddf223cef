//! Failure kinds and the matching relation
//!
//! Retry policies, circuit breakers and abort conditions all select failures
//! by kind. A [`FailureKind`] is an open, named tag; an error type opts in by
//! implementing [`Classify`], which reports its most specific kind and
//! declares which broader kinds it also satisfies.
//!
//! # Example
//!
//! ```rust
//! use guardian::{Classify, FailureKind};
//!
//! const NETWORK: FailureKind = FailureKind::new("network");
//! const CONNECT: FailureKind = FailureKind::new("network.connect");
//!
//! #[derive(Debug)]
//! struct ConnectError;
//!
//! impl Classify for ConnectError {
//!     fn kind(&self) -> FailureKind {
//!         CONNECT
//!     }
//!
//!     fn satisfies(&self, kind: &FailureKind) -> bool {
//!         *kind == CONNECT || *kind == NETWORK
//!     }
//! }
//!
//! assert!(ConnectError.satisfies(&NETWORK));
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::io;

/// A named class of failure
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureKind(Cow<'static, str>);

impl FailureKind {
    /// Any `std::io::Error`
    pub const IO: FailureKind = FailureKind::new("io");
    pub const IO_NOT_FOUND: FailureKind = FailureKind::new("io.not_found");
    pub const IO_PERMISSION_DENIED: FailureKind = FailureKind::new("io.permission_denied");
    pub const IO_CONNECTION_REFUSED: FailureKind = FailureKind::new("io.connection_refused");
    pub const IO_CONNECTION_RESET: FailureKind = FailureKind::new("io.connection_reset");
    pub const IO_CONNECTION_ABORTED: FailureKind = FailureKind::new("io.connection_aborted");
    pub const IO_TIMED_OUT: FailureKind = FailureKind::new("io.timed_out");
    pub const IO_INTERRUPTED: FailureKind = FailureKind::new("io.interrupted");
    pub const IO_UNEXPECTED_EOF: FailureKind = FailureKind::new("io.unexpected_eof");

    /// Every failure produced by a guarded execution
    pub const EXECUTION: FailureKind = FailureKind::new("guardian.execution");
    pub const EXHAUSTED: FailureKind = FailureKind::new("guardian.exhausted");
    pub const CIRCUIT_OPEN: FailureKind = FailureKind::new("guardian.circuit_open");
    pub const ABORTED: FailureKind = FailureKind::new("guardian.aborted");
    pub const FALLBACK: FailureKind = FailureKind::new("guardian.fallback");
    pub const CANCELLED: FailureKind = FailureKind::new("guardian.cancelled");

    /// Create a kind from a static name
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Create a kind from a runtime name, e.g. one read from a config file
    pub fn named(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The kind's name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for FailureKind {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

/// Classification of an error into failure kinds
///
/// `satisfies` is the substitutability relation used everywhere a set of
/// kinds is matched. The default only accepts the exact kind; override it to
/// declare supertypes.
pub trait Classify {
    /// The most specific kind of this failure
    fn kind(&self) -> FailureKind;

    /// Whether this failure counts as `kind`
    fn satisfies(&self, kind: &FailureKind) -> bool {
        self.kind() == *kind
    }

    /// Whether this failure is an aborted execution propagated from a nested
    /// guarded call
    fn is_abort(&self) -> bool {
        false
    }
}

impl<T: Classify + ?Sized> Classify for &T {
    fn kind(&self) -> FailureKind {
        (**self).kind()
    }

    fn satisfies(&self, kind: &FailureKind) -> bool {
        (**self).satisfies(kind)
    }

    fn is_abort(&self) -> bool {
        (**self).is_abort()
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn kind(&self) -> FailureKind {
        (**self).kind()
    }

    fn satisfies(&self, kind: &FailureKind) -> bool {
        (**self).satisfies(kind)
    }

    fn is_abort(&self) -> bool {
        (**self).is_abort()
    }
}

impl Classify for io::Error {
    fn kind(&self) -> FailureKind {
        match io::Error::kind(self) {
            io::ErrorKind::NotFound => FailureKind::IO_NOT_FOUND,
            io::ErrorKind::PermissionDenied => FailureKind::IO_PERMISSION_DENIED,
            io::ErrorKind::ConnectionRefused => FailureKind::IO_CONNECTION_REFUSED,
            io::ErrorKind::ConnectionReset => FailureKind::IO_CONNECTION_RESET,
            io::ErrorKind::ConnectionAborted => FailureKind::IO_CONNECTION_ABORTED,
            io::ErrorKind::TimedOut => FailureKind::IO_TIMED_OUT,
            io::ErrorKind::Interrupted => FailureKind::IO_INTERRUPTED,
            io::ErrorKind::UnexpectedEof => FailureKind::IO_UNEXPECTED_EOF,
            _ => FailureKind::IO,
        }
    }

    fn satisfies(&self, kind: &FailureKind) -> bool {
        *kind == FailureKind::IO || Classify::kind(self) == *kind
    }
}

/// A set of failure kinds
///
/// What an empty set means is up to the caller: retry policies and circuit
/// breakers treat it as "every failure", abort conditions as "none".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureKinds(HashSet<FailureKind>);

impl FailureKinds {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kind; returns false if it was already present
    pub fn insert(&mut self, kind: impl Into<FailureKind>) -> bool {
        self.0.insert(kind.into())
    }

    pub fn contains(&self, kind: &FailureKind) -> bool {
        self.0.contains(kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FailureKind> {
        self.0.iter()
    }

    /// The first member `failure` satisfies, if any
    pub fn matching<F: Classify + ?Sized>(&self, failure: &F) -> Option<&FailureKind> {
        self.0.iter().find(|kind| failure.satisfies(kind))
    }

    /// Whether `failure` satisfies any member
    pub fn matches<F: Classify + ?Sized>(&self, failure: &F) -> bool {
        self.matching(failure).is_some()
    }
}

impl<K: Into<FailureKind>> FromIterator<K> for FailureKinds {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<FailureKind>> Extend<K> for FailureKinds {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}
