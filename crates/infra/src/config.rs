//! Process configuration, read from `WRITEQ_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::jobs::{AttemptTracking, RestoreFailure, RetryLimit, RetryPolicy, SineBackoff};

/// A configuration value could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Backoff tuning knobs. Unset fields keep the `SineBackoff` defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BackoffConfig {
    pub base: Option<Duration>,
    pub growth: Option<f64>,
    pub amplitude: Option<f64>,
    pub frequency: Option<f64>,
    pub max: Option<Duration>,
}

impl BackoffConfig {
    pub fn to_backoff(&self) -> SineBackoff {
        let d = SineBackoff::default();
        SineBackoff::new(
            self.base.unwrap_or(d.base()),
            self.growth.unwrap_or(d.growth()),
            self.amplitude.unwrap_or(d.amplitude()),
            self.frequency.unwrap_or(d.frequency()),
            self.max.unwrap_or(d.max()),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub state_path: PathBuf,
    pub persist_interval: Option<Duration>,
    pub target_url: String,
    pub target_timeout: Duration,
    pub backoff: BackoffConfig,
    pub retry_limit: RetryLimit,
    pub attempt_tracking: AttemptTracking,
    pub on_restore_error: RestoreFailure,
    pub drain_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            debug: false,
            state_path: PathBuf::from("./data/pending_jobs.json"),
            persist_interval: None,
            target_url: "http://127.0.0.1:9000".to_string(),
            target_timeout: Duration::from_millis(10_000),
            backoff: BackoffConfig::default(),
            retry_limit: RetryLimit::Unbounded,
            attempt_tracking: AttemptTracking::Shared,
            on_restore_error: RestoreFailure::Abort,
            drain_timeout: Duration::from_millis(2_000),
            shutdown_grace: Duration::from_millis(5_000),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(host) = get("WRITEQ_HOST") {
            cfg.host = host;
        }
        if let Some(port) = parse::<u16>(&get, "WRITEQ_PORT")? {
            cfg.port = port;
        }
        if let Some(raw) = get("WRITEQ_DEBUG") {
            cfg.debug = parse_bool("WRITEQ_DEBUG", &raw)?;
        }
        if let Some(path) = get("WRITEQ_STATE_PATH") {
            cfg.state_path = PathBuf::from(path);
        }
        cfg.persist_interval = parse::<u64>(&get, "WRITEQ_PERSIST_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        if let Some(url) = get("WRITEQ_TARGET_URL") {
            cfg.target_url = url;
        }
        if let Some(ms) = parse::<u64>(&get, "WRITEQ_TARGET_TIMEOUT_MS")? {
            cfg.target_timeout = Duration::from_millis(ms);
        }

        cfg.backoff = BackoffConfig {
            base: parse::<u64>(&get, "WRITEQ_BACKOFF_BASE_MS")?.map(Duration::from_millis),
            growth: parse_finite(&get, "WRITEQ_BACKOFF_GROWTH")?,
            amplitude: parse_finite(&get, "WRITEQ_BACKOFF_AMPLITUDE")?,
            frequency: parse_finite(&get, "WRITEQ_BACKOFF_FREQUENCY")?,
            max: parse::<u64>(&get, "WRITEQ_BACKOFF_MAX_MS")?.map(Duration::from_millis),
        };

        if let Some(raw) = get("WRITEQ_MAX_ATTEMPTS") {
            cfg.retry_limit = match raw.to_ascii_lowercase().as_str() {
                "unbounded" | "none" => RetryLimit::Unbounded,
                n => RetryLimit::MaxAttempts(n.parse().map_err(|_| {
                    ConfigError::invalid("WRITEQ_MAX_ATTEMPTS", &raw, "expected `unbounded` or a positive integer")
                })?),
            };
        }
        if let Some(raw) = get("WRITEQ_ATTEMPT_TRACKING") {
            cfg.attempt_tracking = match raw.to_ascii_lowercase().as_str() {
                "shared" => AttemptTracking::Shared,
                "local" => AttemptTracking::Local,
                _ => {
                    return Err(ConfigError::invalid(
                        "WRITEQ_ATTEMPT_TRACKING",
                        raw,
                        "expected `shared` or `local`",
                    ));
                }
            };
        }
        if let Some(raw) = get("WRITEQ_ON_RESTORE_ERROR") {
            cfg.on_restore_error = match raw.to_ascii_lowercase().as_str() {
                "abort" => RestoreFailure::Abort,
                "start-empty" | "start_empty" => RestoreFailure::StartEmpty,
                _ => {
                    return Err(ConfigError::invalid(
                        "WRITEQ_ON_RESTORE_ERROR",
                        raw,
                        "expected `abort` or `start-empty`",
                    ));
                }
            };
        }
        if let Some(ms) = parse::<u64>(&get, "WRITEQ_DRAIN_TIMEOUT_MS")? {
            cfg.drain_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&get, "WRITEQ_SHUTDOWN_GRACE_MS")? {
            cfg.shutdown_grace = Duration::from_millis(ms);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::invalid("WRITEQ_PORT", "0", "port must be non-zero"));
        }
        if self.backoff.max == Some(Duration::ZERO) {
            return Err(ConfigError::invalid(
                "WRITEQ_BACKOFF_MAX_MS",
                "0",
                "maximum backoff must be positive",
            ));
        }
        if self.retry_limit == RetryLimit::MaxAttempts(0) {
            return Err(ConfigError::invalid(
                "WRITEQ_MAX_ATTEMPTS",
                "0",
                "use `unbounded` or a positive integer",
            ));
        }
        if self.target_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "WRITEQ_TARGET_TIMEOUT_MS",
                "0",
                "timeout must be positive",
            ));
        }
        match reqwest::Url::parse(&self.target_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::invalid(
                    "WRITEQ_TARGET_URL",
                    self.target_url.as_str(),
                    format!("unsupported scheme {:?}", url.scheme()),
                ));
            }
            Err(e) => {
                return Err(ConfigError::invalid(
                    "WRITEQ_TARGET_URL",
                    self.target_url.as_str(),
                    e.to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_backoff(self.backoff.to_backoff())
            .with_limit(self.retry_limit)
            .with_tracking(self.attempt_tracking)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ConfigError::invalid(key, &raw, e.to_string()))
        })
        .transpose()
}

fn parse_finite(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<f64>, ConfigError> {
    match parse::<f64>(get, key)? {
        Some(v) if !v.is_finite() => Err(ConfigError::invalid(key, v.to_string(), "must be a finite number")),
        other => Ok(other),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "expected a boolean")),
    }
}
