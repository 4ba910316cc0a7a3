use crate::error::{CollectorError, Result};
use std::time::Duration;

/// Top-level runtime configuration for the collector.
///
/// Defaults are suitable for local development; `from_env()` applies
/// environment overrides the same way the deployment manifests do.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub database_url: String,
    pub web_bind_address: String,
    pub intake: IntakeConfig,
    pub connection: ConnectionConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub concurrency: ConcurrencyConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
}

/// Retry policy applied by the message intake guard to a failing message.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Total processing attempts per message (original + retries).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Visibility timeout handed to the queue on read, seconds.
    pub visibility_timeout_secs: i32,
}

/// Streaming connection settings for the source-service channel.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Per-call timeout on the streaming channel.
    pub request_timeout: Duration,
    /// Transport connect timeout.
    pub connect_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub keep_alive_max_lifetime: Duration,
    /// Connect-time retry attempts before entering fallback mode.
    pub connect_max_attempts: u32,
    /// Exponential backoff base for connect-time retries.
    pub connect_backoff_base: Duration,
    /// Exponential backoff ceiling for connect-time retries.
    pub connect_backoff_max: Duration,
    /// Delay before the first reattempt after an unexpected disconnect.
    pub reconnect_delay: Duration,
    /// Reconnect attempts after an unexpected disconnect before fallback.
    pub max_reconnect_attempts: u32,
}

/// Circuit breaker thresholds for remote source-service calls.
#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
    pub call_timeout: Duration,
    pub call_retry_attempts: u32,
}

/// Admission limits for mutation operations.
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    pub max_concurrent_operations_total: usize,
    pub max_concurrent_operations_per_user: usize,
    /// Bounded wait for a system-wide slot.
    pub system_acquire_timeout: Duration,
    /// Bounded wait for a per-caller slot.
    pub user_acquire_timeout: Duration,
}

/// Validation cache sizing and expiry.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub time_to_live: Duration,
}

/// Defaults applied to newly captured exceptions.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub default_max_retries: i32,
    /// Advertised completion estimate returned from initiate_retry.
    pub estimated_completion: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/exception_collector_development".to_string(),
            web_bind_address: "0.0.0.0:8080".to_string(),
            intake: IntakeConfig {
                max_attempts: 3,
                retry_delay: Duration::from_secs(60),
                visibility_timeout_secs: 90,
            },
            connection: ConnectionConfig {
                host: "localhost".to_string(),
                port: 7000,
                request_timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(10),
                keep_alive_interval: Duration::from_secs(20),
                keep_alive_max_lifetime: Duration::from_secs(90),
                connect_max_attempts: 3,
                connect_backoff_base: Duration::from_secs(1),
                connect_backoff_max: Duration::from_secs(10),
                reconnect_delay: Duration::from_secs(5),
                max_reconnect_attempts: 5,
            },
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 5,
                open_timeout: Duration::from_secs(30),
                success_threshold: 2,
                call_timeout: Duration::from_secs(5),
                call_retry_attempts: 2,
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_operations_total: 10,
                max_concurrent_operations_per_user: 3,
                system_acquire_timeout: Duration::from_secs(5),
                user_acquire_timeout: Duration::from_secs(2),
            },
            cache: CacheConfig {
                max_entries: 10_000,
                time_to_live: Duration::from_secs(300),
            },
            retry: RetryConfig {
                default_max_retries: 5,
                estimated_completion: Duration::from_secs(300),
            },
        }
    }
}

impl CollectorConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(bind) = std::env::var("COLLECTOR_BIND_ADDRESS") {
            config.web_bind_address = bind;
        }

        if let Ok(host) = std::env::var("COLLECTOR_SOURCE_HOST") {
            config.connection.host = host;
        }

        if let Ok(port) = std::env::var("COLLECTOR_SOURCE_PORT") {
            config.connection.port = port.parse().map_err(|e| {
                CollectorError::ConfigurationError(format!("Invalid source port: {e}"))
            })?;
        }

        if let Ok(total) = std::env::var("COLLECTOR_MAX_CONCURRENT_OPERATIONS") {
            config.concurrency.max_concurrent_operations_total = total.parse().map_err(|e| {
                CollectorError::ConfigurationError(format!("Invalid max concurrent operations: {e}"))
            })?;
        }

        if let Ok(per_user) = std::env::var("COLLECTOR_MAX_CONCURRENT_OPERATIONS_PER_USER") {
            config.concurrency.max_concurrent_operations_per_user =
                per_user.parse().map_err(|e| {
                    CollectorError::ConfigurationError(format!(
                        "Invalid per-user concurrent operations: {e}"
                    ))
                })?;
        }

        if let Ok(max_retries) = std::env::var("COLLECTOR_DEFAULT_MAX_RETRIES") {
            config.retry.default_max_retries = max_retries.parse().map_err(|e| {
                CollectorError::ConfigurationError(format!("Invalid default max retries: {e}"))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = CollectorConfig::default();
        assert_eq!(config.intake.max_attempts, 3);
        assert_eq!(config.intake.retry_delay, Duration::from_secs(60));
        assert_eq!(config.concurrency.max_concurrent_operations_total, 10);
        assert!(config.connection.port > 0);
    }
}
