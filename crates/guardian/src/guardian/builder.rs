//! Assembly of a [`Guardian`] execution configuration

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::GuardianResult;
use crate::kind::{Classify, FailureKind, FailureKinds};
use crate::retry::RetryPolicy;

use super::executor::{AbortWhen, FallbackFn, Guardian, ResultPredicate};

const DEFAULT_NAME: &str = "guardian";

/// Builder for a [`Guardian`]
///
/// Every component is optional. Without a retry policy the operation is
/// attempted once; without a fallback the final failure is returned.
pub struct GuardianBuilder<T, E> {
    name: Option<String>,
    retry_policy: Option<Arc<RetryPolicy>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    fallback: Option<FallbackFn<T, E>>,
    abort_on: FailureKinds,
    abort_when: Option<AbortWhen<T>>,
    abort_if: Option<ResultPredicate<T>>,
}

impl<T, E> Default for GuardianBuilder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> GuardianBuilder<T, E> {
    pub fn new() -> Self {
        Self {
            name: None,
            retry_policy: None,
            circuit_breaker: None,
            fallback: None,
            abort_on: FailureKinds::new(),
            abort_when: None,
            abort_if: None,
        }
    }

    /// Operation name used in logs
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn retry_policy(mut self, policy: impl Into<Arc<RetryPolicy>>) -> Self {
        self.retry_policy = Some(policy.into());
        self
    }

    /// Guard calls with `breaker`; pass an `Arc` to share it between guardians
    pub fn circuit_breaker(mut self, breaker: impl Into<Arc<CircuitBreaker>>) -> Self {
        self.circuit_breaker = Some(breaker.into());
        self
    }

    /// Action producing the result once the operation has failed for good
    pub fn fallback<F, Fut>(mut self, fallback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.fallback = Some(Arc::new(move || fallback().boxed()));
        self
    }

    /// Abort immediately when the operation fails with `kind`
    pub fn abort_on(mut self, kind: impl Into<FailureKind>) -> Self {
        self.abort_on.insert(kind);
        self
    }

    /// Abort when `predicate` holds for a successful result
    pub fn abort_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.abort_if = Some(Arc::new(predicate));
        self
    }

    pub fn build(self) -> Guardian<T, E> {
        Guardian {
            name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            retry_policy: self.retry_policy,
            circuit_breaker: self.circuit_breaker,
            fallback: self.fallback,
            abort_on: self.abort_on,
            abort_when: self.abort_when,
            abort_if: self.abort_if,
        }
    }

    /// Build and execute `op` in one step
    pub async fn get<F, Fut>(self, op: F) -> GuardianResult<T, E>
    where
        E: Error + Classify + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.build().execute(op).await
    }
}

impl<E> GuardianBuilder<(), E> {
    /// Build and execute an operation that produces no value
    pub async fn run<F, Fut>(self, op: F) -> GuardianResult<(), E>
    where
        E: Error + Classify + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        self.get(op).await
    }
}

impl<E> GuardianBuilder<bool, E> {
    /// Abort when the operation returns `sentinel`
    pub fn abort_when(mut self, sentinel: bool) -> Self {
        self.abort_when = Some(AbortWhen {
            sentinel,
            check: Arc::new(move |result: &bool| *result == sentinel),
        });
        self
    }
}
