use std::str::FromStr;
use std::time::Duration;

use leadq_core::scoring::{ScoringConfig, DEFAULT_NUMERIC_TOLERANCE};
use leadq_core::training::{
    TrainingConfig, DEFAULT_MIN_OUTCOMES_PER_CLASS, DEFAULT_MIN_TRAINING_OUTCOMES,
    DEFAULT_RETRAIN_TRIGGER,
};
use leadq_core::webhook::{
    RetryPolicy, DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_MAX_ATTEMPTS,
};
use leadq_events::DispatcherConfig;

/// A configuration value that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{key} has invalid value '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Webhook delivery settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub max_attempts: i32,
    pub backoff_base_secs: i64,
    pub backoff_max_secs: i64,
    /// Per-attempt HTTP timeout.
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_batch: i64,
    pub lease_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            timeout_secs: 10,
            sweep_interval_secs: 15,
            sweep_batch: 50,
            lease_secs: 60,
        }
    }
}

impl WebhookConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_secs: self.backoff_base_secs,
            max_backoff_secs: self.backoff_max_secs,
        }
    }

    /// Reject settings the delivery pipeline cannot run with.
    ///
    /// The lease must outlast one HTTP attempt, otherwise a sweep can
    /// re-claim a row whose send is still running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: String| Err(ConfigError { key, value });
        if self.max_attempts < 1 {
            return invalid("WEBHOOK_MAX_ATTEMPTS", self.max_attempts.to_string());
        }
        if self.sweep_interval_secs == 0 {
            return invalid("DELIVERY_SWEEP_INTERVAL_SECS", self.sweep_interval_secs.to_string());
        }
        if self.sweep_batch < 1 {
            return invalid("DELIVERY_SWEEP_BATCH", self.sweep_batch.to_string());
        }
        if self.lease_secs <= self.timeout_secs {
            return invalid("DELIVERY_LEASE_SECS", self.lease_secs.to_string());
        }
        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            retry: self.retry_policy(),
            lease_secs: self.lease_secs as f64,
            sweep_batch: self.sweep_batch,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub scoring: ScoringConfig,
    pub training: TrainingConfig,
    pub webhooks: WebhookConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: 30,
            scoring: ScoringConfig::default(),
            training: TrainingConfig::default(),
            webhooks: WebhookConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `HOST`                         | `0.0.0.0`               |
    /// | `PORT`                         | `3000`                  |
    /// | `CORS_ORIGINS`                 | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`         | `30`                    |
    /// | `MIN_TRAINING_OUTCOMES`        | `50`                    |
    /// | `MIN_OUTCOMES_PER_CLASS`       | `5`                     |
    /// | `RETRAIN_TRIGGER_OUTCOMES`     | `50`                    |
    /// | `NUMERIC_TOLERANCE`            | `0.5`                   |
    /// | `WEBHOOK_MAX_ATTEMPTS`         | `5`                     |
    /// | `WEBHOOK_BACKOFF_BASE_SECS`    | `30`                    |
    /// | `WEBHOOK_BACKOFF_MAX_SECS`     | `3600`                  |
    /// | `WEBHOOK_TIMEOUT_SECS`         | `10`                    |
    /// | `DELIVERY_SWEEP_INTERVAL_SECS` | `15`                    |
    /// | `DELIVERY_SWEEP_BATCH`         | `50`                    |
    /// | `DELIVERY_LEASE_SECS`          | `60`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let webhook_defaults = WebhookConfig::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);

        let cors_origins: Vec<String> = match std::env::var("CORS_ORIGINS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.cors_origins,
        };

        let numeric_tolerance: f64 = env_or("NUMERIC_TOLERANCE", DEFAULT_NUMERIC_TOLERANCE)?;
        if !(numeric_tolerance > 0.0 && numeric_tolerance.is_finite()) {
            return Err(ConfigError {
                key: "NUMERIC_TOLERANCE",
                value: numeric_tolerance.to_string(),
            });
        }

        let webhooks = WebhookConfig {
            max_attempts: env_or("WEBHOOK_MAX_ATTEMPTS", webhook_defaults.max_attempts)?,
            backoff_base_secs: env_or(
                "WEBHOOK_BACKOFF_BASE_SECS",
                webhook_defaults.backoff_base_secs,
            )?,
            backoff_max_secs: env_or("WEBHOOK_BACKOFF_MAX_SECS", webhook_defaults.backoff_max_secs)?,
            timeout_secs: env_or("WEBHOOK_TIMEOUT_SECS", webhook_defaults.timeout_secs)?,
            sweep_interval_secs: env_or(
                "DELIVERY_SWEEP_INTERVAL_SECS",
                webhook_defaults.sweep_interval_secs,
            )?,
            sweep_batch: env_or("DELIVERY_SWEEP_BATCH", webhook_defaults.sweep_batch)?,
            lease_secs: env_or("DELIVERY_LEASE_SECS", webhook_defaults.lease_secs)?,
        };
        webhooks.validate()?;

        Ok(Self {
            host,
            port: env_or("PORT", defaults.port)?,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            scoring: ScoringConfig { numeric_tolerance },
            training: TrainingConfig {
                min_total: env_or("MIN_TRAINING_OUTCOMES", DEFAULT_MIN_TRAINING_OUTCOMES)?,
                min_per_class: env_or("MIN_OUTCOMES_PER_CLASS", DEFAULT_MIN_OUTCOMES_PER_CLASS)?,
                retrain_trigger: env_or("RETRAIN_TRIGGER_OUTCOMES", DEFAULT_RETRAIN_TRIGGER)?,
            },
            webhooks,
        })
    }
}

/// Parse `key` from the environment, falling back to `default` when unset.
fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError { key, value }),
        Err(_) => Ok(default),
    }
}
