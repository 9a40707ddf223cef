//! File-based guardian configuration
//!
//! Retry and circuit breaker settings can be loaded from YAML and
//! overridden from the environment:
//!
//! ```yaml
//! retry:
//!   max-retries: 3
//!   base-delay-ms: 500
//!   backoff: exponential
//!   multiplier: 2.0
//!   retry-on: [io]
//! circuit-breaker:
//!   failure-threshold: 5
//!   reset-timeout-ms: 30000
//! abort-on: [io.not_found]
//! ```
//!
//! Environment overrides:
//! - `GUARDIAN_MAX_RETRIES`
//! - `GUARDIAN_BASE_DELAY_MS`
//! - `GUARDIAN_MULTIPLIER`
//! - `GUARDIAN_FAILURE_THRESHOLD`
//! - `GUARDIAN_RESET_TIMEOUT_MS`

use std::env;
use std::fs;
use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::ConfigError;
use crate::guardian::GuardianBuilder;
use crate::kind::FailureKind;
use crate::retry::{BackoffStrategy, RetryPolicy};

/// Complete guardian configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GuardianConfig {
    /// Retry settings; no retries when absent
    #[serde(default)]
    pub retry: Option<RetryConfig>,

    /// Circuit breaker settings; no breaker when absent
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    /// Failure kinds that abort the execution immediately
    #[serde(default)]
    pub abort_on: Vec<FailureKind>,
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Growth factor for exponential backoff
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound for any single delay, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,

    #[serde(default)]
    pub jitter: bool,

    /// Retry only these failure kinds; every failure when empty
    #[serde(default)]
    pub retry_on: Vec<FailureKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff: BackoffStrategy::default(),
            multiplier: default_multiplier(),
            max_delay_ms: None,
            jitter: false,
            retry_on: Vec::new(),
        }
    }
}

impl RetryConfig {
    pub fn build(&self) -> Result<RetryPolicy, ConfigError> {
        let mut policy = RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
            .with_backoff(self.backoff, self.multiplier)?
            .with_jitter(self.jitter);

        if let Some(max_delay_ms) = self.max_delay_ms {
            policy = policy.with_max_delay(Duration::from_millis(max_delay_ms));
        }
        for kind in &self.retry_on {
            policy = policy.retry_on(kind.clone());
        }
        Ok(policy)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CircuitBreakerConfig {
    /// Breaker name used in logs and rejections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time an open breaker waits before admitting a trial call
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Count only these failure kinds; every failure when empty
    #[serde(default)]
    pub handle: Vec<FailureKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: None,
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            handle: Vec::new(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn build(&self) -> Result<CircuitBreaker, ConfigError> {
        let mut builder = CircuitBreaker::builder()
            .failure_threshold(self.failure_threshold)
            .reset_timeout(Duration::from_millis(self.reset_timeout_ms));

        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        for kind in &self.handle {
            builder = builder.handle(kind.clone());
        }
        builder.build()
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

impl GuardianConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        debug!("Loading guardian config from {}", path);
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `GUARDIAN_*` environment overrides
    ///
    /// An override for a section that is absent enables it with defaults.
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(val) = env_value("GUARDIAN_MAX_RETRIES") {
            self.retry_config().max_retries = parse_env("GUARDIAN_MAX_RETRIES", &val)?;
        }

        if let Some(val) = env_value("GUARDIAN_BASE_DELAY_MS") {
            self.retry_config().base_delay_ms = parse_env("GUARDIAN_BASE_DELAY_MS", &val)?;
        }

        if let Some(val) = env_value("GUARDIAN_MULTIPLIER") {
            self.retry_config().multiplier = parse_env("GUARDIAN_MULTIPLIER", &val)?;
        }

        if let Some(val) = env_value("GUARDIAN_FAILURE_THRESHOLD") {
            self.breaker_config().failure_threshold =
                parse_env("GUARDIAN_FAILURE_THRESHOLD", &val)?;
        }

        if let Some(val) = env_value("GUARDIAN_RESET_TIMEOUT_MS") {
            self.breaker_config().reset_timeout_ms = parse_env("GUARDIAN_RESET_TIMEOUT_MS", &val)?;
        }

        Ok(self)
    }

    /// Start a [`GuardianBuilder`] populated from this configuration
    ///
    /// The breaker built here is owned by the returned builder; share one
    /// breaker across guardians by building it once and passing it in.
    pub fn builder<T, E>(&self) -> Result<GuardianBuilder<T, E>, ConfigError> {
        let mut builder = GuardianBuilder::new();
        if let Some(retry) = &self.retry {
            builder = builder.retry_policy(retry.build()?);
        }
        if let Some(breaker) = &self.circuit_breaker {
            builder = builder.circuit_breaker(breaker.build()?);
        }
        for kind in &self.abort_on {
            builder = builder.abort_on(kind.clone());
        }
        Ok(builder)
    }

    fn retry_config(&mut self) -> &mut RetryConfig {
        self.retry.get_or_insert_with(RetryConfig::default)
    }

    fn breaker_config(&mut self) -> &mut CircuitBreakerConfig {
        self.circuit_breaker
            .get_or_insert_with(CircuitBreakerConfig::default)
    }
}

fn env_value(var: &str) -> Option<String> {
    env::var(var).ok()
}

fn parse_env<V: std::str::FromStr>(var: &str, val: &str) -> Result<V, ConfigError> {
    val.trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env(var, format!("must be a valid number, got {:?}", val)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 5] = [
        "GUARDIAN_MAX_RETRIES",
        "GUARDIAN_BASE_DELAY_MS",
        "GUARDIAN_MULTIPLIER",
        "GUARDIAN_FAILURE_THRESHOLD",
        "GUARDIAN_RESET_TIMEOUT_MS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_empty_config() {
        let config = GuardianConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, GuardianConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
retry:
  max-retries: 4
  base-delay-ms: 250
  backoff: exponential
  multiplier: 1.5
  max-delay-ms: 2000
  jitter: true
  retry-on: [io.timed_out, io.connection_reset]
circuit-breaker:
  name: payments
  failure-threshold: 2
  reset-timeout-ms: 100
  handle: [io]
abort-on: [io.not_found]
"#;
        let config = GuardianConfig::from_yaml_str(yaml).unwrap();

        let retry = config.retry.as_ref().unwrap();
        assert_eq!(retry.max_retries, 4);
        assert_eq!(retry.backoff, BackoffStrategy::Exponential);
        assert_eq!(retry.max_delay_ms, Some(2000));
        assert!(retry.jitter);

        let policy = retry.build().unwrap();
        assert_eq!(policy.base_delay(), Duration::from_millis(250));
        assert_eq!(policy.multiplier(), 1.5);
        assert_eq!(policy.max_delay(), Some(Duration::from_secs(2)));
        assert!(policy.retryable_failures().contains(&FailureKind::IO_TIMED_OUT));
        assert!(policy.retryable_failures().contains(&FailureKind::IO_CONNECTION_RESET));

        let breaker = config.circuit_breaker.as_ref().unwrap().build().unwrap();
        assert_eq!(breaker.name(), "payments");
        assert_eq!(breaker.failure_threshold(), 2);
        assert_eq!(breaker.reset_timeout(), Duration::from_millis(100));
        assert!(breaker.handled_failures().contains(&FailureKind::IO));

        assert_eq!(config.abort_on, vec![FailureKind::IO_NOT_FOUND]);
    }

    #[test]
    fn test_section_defaults() {
        let config = GuardianConfig::from_yaml_str("retry: {}\ncircuit-breaker: {}").unwrap();
        assert_eq!(config.retry, Some(RetryConfig::default()));
        assert_eq!(config.circuit_breaker, Some(CircuitBreakerConfig::default()));

        let policy = config.retry.unwrap().build().unwrap();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.base_delay(), Duration::from_secs(1));
        assert_eq!(policy.backoff_strategy(), BackoffStrategy::Simple);
    }

    #[test]
    fn test_invalid_values_rejected_on_build() {
        let config = RetryConfig {
            backoff: BackoffStrategy::Exponential,
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.build(),
            Err(ConfigError::InvalidArgument { field: "multiplier", .. })
        ));

        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.build(),
            Err(ConfigError::InvalidArgument { field: "failure_threshold", .. })
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        let result = GuardianConfig::from_yaml_str("retry:\n  max-retries: lots");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp_dir.path().join("guardian.yaml")).unwrap();
        fs::write(&path, "retry:\n  max-retries: 7\n").unwrap();

        let config = GuardianConfig::from_file(&path).unwrap();
        assert_eq!(config.retry.unwrap().max_retries, 7);
        assert!(config.circuit_breaker.is_none());
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp_dir.path().join("absent.yaml")).unwrap();

        let err = GuardianConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("GUARDIAN_MAX_RETRIES", "9");
        env::set_var("GUARDIAN_MULTIPLIER", "3.0");
        env::set_var("GUARDIAN_RESET_TIMEOUT_MS", "500");

        let config = GuardianConfig::from_yaml_str("retry:\n  max-retries: 1\n")
            .unwrap()
            .apply_env_overrides()
            .unwrap();

        let retry = config.retry.unwrap();
        assert_eq!(retry.max_retries, 9);
        assert_eq!(retry.multiplier, 3.0);
        assert_eq!(retry.base_delay_ms, 1000);

        // Absent section enabled by the override
        let breaker = config.circuit_breaker.unwrap();
        assert_eq!(breaker.reset_timeout_ms, 500);
        assert_eq!(breaker.failure_threshold, 5);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_number() {
        clear_env();
        env::set_var("GUARDIAN_FAILURE_THRESHOLD", "many");

        let err = GuardianConfig::default().apply_env_overrides().unwrap_err();
        assert!(matches!(
            &err,
            ConfigError::InvalidEnv { var, .. } if var == "GUARDIAN_FAILURE_THRESHOLD"
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_no_env_overrides_leaves_config_untouched() {
        clear_env();
        let config = GuardianConfig::default().apply_env_overrides().unwrap();
        assert_eq!(config, GuardianConfig::default());
    }

    #[tokio::test]
    async fn test_builder_from_config() {
        let config = GuardianConfig::from_yaml_str(
            "retry:\n  max-retries: 2\n  base-delay-ms: 0\ncircuit-breaker:\n  failure-threshold: 10\n",
        )
        .unwrap();

        let guardian = config.builder::<u32, std::io::Error>().unwrap().build();
        assert_eq!(guardian.retry_policy().unwrap().max_retries(), 2);
        assert_eq!(guardian.circuit_breaker().unwrap().failure_threshold(), 10);

        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = guardian
            .execute(|| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(std::io::Error::other("down")) }
            })
            .await;
        assert_eq!(result.unwrap_err().attempts(), 3);
        assert_eq!(calls.into_inner(), 3);
    }
}
