//! Configuration management for the Tillgate resilience layer.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{circuit::CircuitConfig, observer::ObserverConfig, retry::RetryConfig};

const CONFIG_FILE: &str = "tillgate.toml";

/// Complete resilience configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`tillgate.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// The layer works out-of-the-box with production-ready defaults. Create
/// `tillgate.toml` to customize configuration, or use environment variables
/// for deployment-specific overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Circuit breaker
    /// Failures before a breaker opens.
    ///
    /// Environment variable: `CIRCUIT_BREAKER_THRESHOLD`
    #[serde(default = "default_breaker_threshold", alias = "CIRCUIT_BREAKER_THRESHOLD")]
    pub circuit_breaker_threshold: u32,
    /// Seconds an open breaker blocks requests before probing.
    ///
    /// Environment variable: `CIRCUIT_BREAKER_COOLDOWN_SECONDS`
    #[serde(default = "default_breaker_cooldown", alias = "CIRCUIT_BREAKER_COOLDOWN_SECONDS")]
    pub circuit_breaker_cooldown_seconds: u64,

    // Retry
    /// Whether retries are enabled when no terminal/tenant override says.
    ///
    /// Environment variable: `RETRY_ENABLED`
    #[serde(default = "default_retry_enabled", alias = "RETRY_ENABLED")]
    pub retry_enabled: bool,
    /// Retry budget when neither terminal nor tenant configures one.
    ///
    /// Environment variable: `RETRY_MAX_RETRIES`
    #[serde(default = "default_max_retries", alias = "RETRY_MAX_RETRIES")]
    pub retry_max_retries: u32,
    /// Base backoff interval in seconds for server errors.
    ///
    /// Environment variable: `RETRY_INTERVAL_SEC`
    #[serde(default = "default_retry_interval", alias = "RETRY_INTERVAL_SEC")]
    pub retry_interval_sec: u64,
    /// Upper bound in seconds on any computed backoff delay.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_SEC`
    #[serde(default = "default_max_delay", alias = "RETRY_MAX_DELAY_SEC")]
    pub retry_max_delay_sec: u64,
    /// Fixed delay in seconds for network errors.
    ///
    /// Environment variable: `RETRY_NETWORK_ERROR_DELAY_SEC`
    #[serde(default = "default_network_delay", alias = "RETRY_NETWORK_ERROR_DELAY_SEC")]
    pub retry_network_error_delay_sec: u64,
    /// Fixed delay in seconds for validation errors.
    ///
    /// Environment variable: `RETRY_VALIDATION_ERROR_DELAY_SEC`
    #[serde(default = "default_validation_delay", alias = "RETRY_VALIDATION_ERROR_DELAY_SEC")]
    pub retry_validation_error_delay_sec: u64,
    /// Half-width in seconds of the backoff jitter band.
    ///
    /// Environment variable: `RETRY_JITTER_SEC`
    #[serde(default = "default_jitter", alias = "RETRY_JITTER_SEC")]
    pub retry_jitter_sec: u64,

    // Tenant observation
    /// Whether tenant failure-ratio observation is enabled.
    ///
    /// Environment variable: `TENANT_OBSERVATION_ENABLED`
    #[serde(default = "default_observation_enabled", alias = "TENANT_OBSERVATION_ENABLED")]
    pub tenant_observation_enabled: bool,
    /// Minimum windowed attempts before the failure ratio is judged.
    ///
    /// Environment variable: `TENANT_OBSERVATION_MIN_REQUESTS`
    #[serde(default = "default_min_requests", alias = "TENANT_OBSERVATION_MIN_REQUESTS")]
    pub tenant_observation_min_requests: u32,
    /// Failure ratio (0-1) at which a tenant alert is raised.
    ///
    /// Environment variable: `TENANT_OBSERVATION_FAILURE_RATIO_THRESHOLD`
    #[serde(
        default = "default_failure_ratio_threshold",
        alias = "TENANT_OBSERVATION_FAILURE_RATIO_THRESHOLD"
    )]
    pub tenant_observation_failure_ratio_threshold: f64,
    /// Observation window length in minutes.
    ///
    /// Environment variable: `TENANT_OBSERVATION_TIME_WINDOW_MINUTES`
    #[serde(
        default = "default_time_window_minutes",
        alias = "TENANT_OBSERVATION_TIME_WINDOW_MINUTES"
    )]
    pub tenant_observation_time_window_minutes: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to circuit breaker configuration.
    pub fn to_circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.circuit_breaker_threshold,
            cooldown: Duration::from_secs(self.circuit_breaker_cooldown_seconds),
        }
    }

    /// Convert to retry scheduler configuration.
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            default_max_retries: self.retry_max_retries,
            retries_enabled: self.retry_enabled,
            base_interval: Duration::from_secs(self.retry_interval_sec),
            max_delay: Duration::from_secs(self.retry_max_delay_sec),
            network_error_delay: Duration::from_secs(self.retry_network_error_delay_sec),
            validation_error_delay: Duration::from_secs(self.retry_validation_error_delay_sec),
            jitter: Duration::from_secs(self.retry_jitter_sec),
        }
    }

    /// Convert to tenant observer configuration.
    pub fn to_observer_config(&self) -> ObserverConfig {
        ObserverConfig {
            enabled: self.tenant_observation_enabled,
            min_requests: self.tenant_observation_min_requests,
            failure_ratio_threshold: self.tenant_observation_failure_ratio_threshold,
            time_window: Duration::from_secs(self.tenant_observation_time_window_minutes * 60),
        }
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.circuit_breaker_threshold == 0 {
            anyhow::bail!("circuit_breaker_threshold must be greater than 0");
        }

        if self.circuit_breaker_cooldown_seconds == 0 {
            anyhow::bail!("circuit_breaker_cooldown_seconds must be greater than 0");
        }

        if self.retry_interval_sec == 0 {
            anyhow::bail!("retry_interval_sec must be greater than 0");
        }

        if self.retry_max_delay_sec < self.retry_interval_sec {
            anyhow::bail!("retry_max_delay_sec cannot be less than retry_interval_sec");
        }

        if !(0.0..=1.0).contains(&self.tenant_observation_failure_ratio_threshold) {
            anyhow::bail!("tenant_observation_failure_ratio_threshold must be between 0 and 1");
        }

        if self.tenant_observation_min_requests == 0 {
            anyhow::bail!("tenant_observation_min_requests must be greater than 0");
        }

        if self.tenant_observation_time_window_minutes == 0 {
            anyhow::bail!("tenant_observation_time_window_minutes must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: default_breaker_threshold(),
            circuit_breaker_cooldown_seconds: default_breaker_cooldown(),
            retry_enabled: default_retry_enabled(),
            retry_max_retries: default_max_retries(),
            retry_interval_sec: default_retry_interval(),
            retry_max_delay_sec: default_max_delay(),
            retry_network_error_delay_sec: default_network_delay(),
            retry_validation_error_delay_sec: default_validation_delay(),
            retry_jitter_sec: default_jitter(),
            tenant_observation_enabled: default_observation_enabled(),
            tenant_observation_min_requests: default_min_requests(),
            tenant_observation_failure_ratio_threshold: default_failure_ratio_threshold(),
            tenant_observation_time_window_minutes: default_time_window_minutes(),
            rust_log: default_log_level(),
        }
    }
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_cooldown() -> u64 {
    300
}

fn default_retry_enabled() -> bool {
    true
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_interval() -> u64 {
    300
}

fn default_max_delay() -> u64 {
    24 * 60 * 60
}

fn default_network_delay() -> u64 {
    60
}

fn default_validation_delay() -> u64 {
    1800
}

fn default_jitter() -> u64 {
    30
}

fn default_observation_enabled() -> bool {
    true
}

fn default_min_requests() -> u32 {
    10
}

fn default_failure_ratio_threshold() -> f64 {
    0.5
}

fn default_time_window_minutes() -> u64 {
    15
}

fn default_log_level() -> String {
    "tillgate=info,tillgate_resilience=info".to_string()
}
