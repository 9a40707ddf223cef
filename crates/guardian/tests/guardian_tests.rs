//! Guarded execution through the public API

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use guardian::retry::{BackoffStrategy, RetryPolicy};
use guardian::{
    CircuitBreaker, CircuitState, Classify, FailureKind, Guardian, GuardianConfig, GuardianError,
};
use thiserror::Error;

/// Failures of a fictional downstream service
#[derive(Debug, Error)]
enum ServiceError {
    #[error("connection refused")]
    Refused,
    #[error("request timed out")]
    Timeout,
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ServiceError {
    const NETWORK: FailureKind = FailureKind::new("service.network");
    const REFUSED: FailureKind = FailureKind::new("service.network.refused");
    const TIMEOUT: FailureKind = FailureKind::new("service.network.timeout");
    const BAD_REQUEST: FailureKind = FailureKind::new("service.bad_request");
}

impl Classify for ServiceError {
    fn kind(&self) -> FailureKind {
        match self {
            Self::Refused => Self::REFUSED,
            Self::Timeout => Self::TIMEOUT,
            Self::BadRequest(_) => Self::BAD_REQUEST,
        }
    }

    fn satisfies(&self, kind: &FailureKind) -> bool {
        match self {
            Self::Refused | Self::Timeout => *kind == Self::NETWORK || self.kind() == *kind,
            Self::BadRequest(_) => self.kind() == *kind,
        }
    }
}

#[tokio::test]
async fn test_always_failing_operation_attempt_counts() {
    for max_retries in 0..6u32 {
        let calls = AtomicU32::new(0);
        let fallbacks = Arc::new(AtomicU32::new(0));
        let fallbacks_clone = fallbacks.clone();

        let result = Guardian::builder()
            .retry_policy(RetryPolicy::new(max_retries, Duration::ZERO))
            .fallback(move || {
                let seen = fallbacks_clone.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, ServiceError>(seen) }
            })
            .get(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::Timeout) }
            })
            .await;

        assert_eq!(result.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_scenario() {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let failed = Arc::new(AtomicU32::new(0));
    let (delays_log, failed_count) = (delays.clone(), failed.clone());

    let policy = RetryPolicy::new(5, Duration::from_millis(500))
        .with_backoff(BackoffStrategy::Exponential, 2.0)
        .unwrap()
        .on_failed_attempt(move |ctx| {
            failed_count.fetch_add(1, Ordering::SeqCst);
            delays_log.lock().unwrap().push(ctx.delay());
        });

    let calls = AtomicU32::new(0);
    let result = Guardian::builder()
        .retry_policy(policy)
        .get(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt <= 2 {
                    Err(ServiceError::Refused)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(failed.load(Ordering::SeqCst), 2);
    assert_eq!(
        *delays.lock().unwrap(),
        vec![Duration::from_millis(500), Duration::from_millis(1000)]
    );
}

#[tokio::test]
async fn test_retry_on_declared_supertype() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = Guardian::builder()
        .retry_policy(RetryPolicy::new(2, Duration::ZERO).retry_on(ServiceError::NETWORK))
        .get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::Refused) }
        })
        .await;

    assert!(result.unwrap_err().is_exhausted());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failure_outside_retry_set_invoked_once() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = Guardian::builder()
        .retry_policy(RetryPolicy::new(5, Duration::ZERO).retry_on(ServiceError::NETWORK))
        .get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::BadRequest("missing id".into())) }
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.attempts(), 1);
    assert_eq!(err.last_failure().unwrap().to_string(), "invalid request: missing id");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abort_conditions_invoke_exactly_once() {
    let calls = AtomicU32::new(0);
    let on_kind: Result<(), _> = Guardian::builder()
        .retry_policy(RetryPolicy::new(5, Duration::ZERO))
        .abort_on(ServiceError::BAD_REQUEST)
        .get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::BadRequest("bad".into())) }
        })
        .await;
    assert!(on_kind.unwrap_err().is_aborted());
    assert_eq!(calls.swap(0, Ordering::SeqCst), 1);

    let on_result: Result<bool, GuardianError<ServiceError>> = Guardian::<bool, ServiceError>::builder()
        .retry_policy(RetryPolicy::new(5, Duration::ZERO))
        .abort_when(true)
        .get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(true) }
        })
        .await;
    assert!(on_result.unwrap_err().is_aborted());
    assert_eq!(calls.swap(0, Ordering::SeqCst), 1);

    let on_predicate: Result<String, GuardianError<ServiceError>> = Guardian::builder()
        .retry_policy(RetryPolicy::new(5, Duration::ZERO))
        .abort_if(|body: &String| body.is_empty())
        .get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(String::new()) }
        })
        .await;
    assert!(on_predicate.unwrap_err().is_aborted());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_scenario() {
    let breaker = Arc::new(
        CircuitBreaker::builder()
            .name("downstream")
            .failure_threshold(2)
            .reset_timeout(Duration::from_millis(100))
            .build()
            .unwrap(),
    );
    let guardian: Guardian<&str, ServiceError> =
        Guardian::builder().circuit_breaker(breaker.clone()).build();

    for _ in 0..2 {
        let _ = guardian.execute(|| async { Err(ServiceError::Timeout) }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected = guardian.execute(|| async { Ok("unreachable") }).await;
    assert!(rejected.unwrap_err().is_circuit_open());

    tokio::time::sleep(Duration::from_millis(150)).await;

    let admitted = guardian.execute(|| async { Ok("admitted") }).await;
    assert_eq!(admitted.unwrap(), "admitted");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_shared_between_guardians() {
    let breaker = Arc::new(CircuitBreaker::new(2, Duration::from_secs(10)).unwrap());
    let writes: Guardian<(), ServiceError> =
        Guardian::builder().name("writes").circuit_breaker(breaker.clone()).build();
    let reads: Guardian<u32, ServiceError> =
        Guardian::builder().name("reads").circuit_breaker(breaker.clone()).build();

    let _ = writes.execute(|| async { Err(ServiceError::Refused) }).await;
    let _ = reads.execute(|| async { Err(ServiceError::Refused) }).await;

    let calls = AtomicU32::new(0);
    let result = reads
        .execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(1) }
        })
        .await;
    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_clone_with_fresh_state() {
    let opened = Arc::new(AtomicU32::new(0));
    let opened_clone = opened.clone();
    let original = CircuitBreaker::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_secs(60))
        .handle(ServiceError::NETWORK)
        .on_open(move |_| {
            opened_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    original.after_call_failure(&ServiceError::Timeout);
    assert_eq!(original.state(), CircuitState::Open);

    let fresh = original.clone_with_fresh_state();
    assert_eq!(fresh.state(), CircuitState::Closed);
    assert_eq!(fresh.failure_count(), 0);
    assert!(fresh.last_failure_time().is_none());
    assert_eq!(fresh.handled_failures(), original.handled_failures());
    assert_eq!(fresh.listener_counts(), original.listener_counts());
    assert!(fresh.shares_configuration_with(&original));

    // Listeners are shared, not duplicated
    fresh.after_call_failure(&ServiceError::Refused);
    assert_eq!(opened.load(Ordering::SeqCst), 2);

    // Unhandled kinds are ignored by both
    let other = original.clone_with_fresh_state();
    other.after_call_failure(&ServiceError::BadRequest("ignored".into()));
    assert_eq!(other.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_panicking_observer_propagates() {
    let guardian: Guardian<(), ServiceError> = Guardian::builder()
        .retry_policy(
            RetryPolicy::new(3, Duration::ZERO).on_failed_attempt(|_| panic!("observer failed")),
        )
        .build();

    let handle = tokio::spawn(async move {
        guardian.execute(|| async { Err(ServiceError::Timeout) }).await
    });

    let join = handle.await;
    assert!(join.unwrap_err().is_panic());
}

#[tokio::test]
async fn test_guardian_from_yaml_config() {
    let config = GuardianConfig::from_yaml_str(
        r#"
retry:
  max-retries: 4
  base-delay-ms: 0
  retry-on: [service.network]
abort-on: [service.bad_request]
"#,
    )
    .unwrap();
    let guardian = config.builder::<u32, ServiceError>().unwrap().build();

    let calls = AtomicU32::new(0);
    let result = guardian
        .execute(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                match attempt {
                    1 | 2 => Err(ServiceError::Timeout),
                    _ => Err(ServiceError::BadRequest("stop".into())),
                }
            }
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(err.attempts(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
