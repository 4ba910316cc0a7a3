//! # Circuit Breaker Implementation
//!
//! Classic three-state breaker guarding calls to a source service:
//! Closed (normal), Open (failing fast), Half-Open (testing recovery).
//! When open, calls short-circuit to an error without touching the
//! network.

use crate::config::CircuitBreakerSettings;
use crate::resilience::metrics::CircuitBreakerMetrics;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test remote health
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Core circuit breaker with atomic state management
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,
    /// Current circuit state (atomic for thread safety)
    state: AtomicU8,
    config: CircuitBreakerSettings,
    metrics: Arc<Mutex<CircuitBreakerMetrics>>,
    /// Time when circuit was opened (for timeout calculations)
    opened_at: Arc<Mutex<Option<Instant>>>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerSettings) -> Self {
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            open_timeout_secs = config.open_timeout.as_secs(),
            success_threshold = config.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            metrics: Arc::new(Mutex::new(CircuitBreakerMetrics::new())),
            opened_at: Arc::new(Mutex::new(None)),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow_call().await {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => self.record_success(duration).await,
            Err(_) => self.record_failure(duration).await,
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Check if a call should be allowed based on current state
    async fn should_allow_call(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = self.opened_at.lock().await;
                match *opened_at {
                    Some(opened_time) if opened_time.elapsed() >= self.config.open_timeout => {
                        drop(opened_at);
                        self.transition_to_half_open().await;
                        true
                    }
                    Some(_) => false,
                    None => {
                        // Open without a timestamp should not happen; allow the call
                        warn!(component = %self.name, "Circuit open but no timestamp recorded");
                        true
                    }
                }
            }
            CircuitState::HalfOpen => {
                let metrics = self.metrics.lock().await;
                metrics.half_open_calls < self.config.success_threshold as u64
            }
        }
    }

    async fn record_success(&self, duration: std::time::Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.success_count += 1;
        metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis(),
            "Protected call succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                metrics.half_open_calls += 1;
                if metrics.half_open_calls >= self.config.success_threshold as u64 {
                    drop(metrics);
                    self.transition_to_closed().await;
                }
            }
            CircuitState::Closed => {
                metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    async fn record_failure(&self, duration: std::time::Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.failure_count += 1;
        metrics.total_duration += duration;

        error!(
            component = %self.name,
            duration_ms = duration.as_millis(),
            "Protected call failed"
        );

        match self.state() {
            CircuitState::Closed => {
                metrics.consecutive_failures += 1;
                if metrics.consecutive_failures >= self.config.failure_threshold as u64 {
                    drop(metrics);
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state immediately re-opens
                drop(metrics);
                self.transition_to_open().await;
            }
            CircuitState::Open => {}
        }
    }

    async fn transition_to_closed(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.consecutive_failures = 0;
        metrics.half_open_calls = 0;

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = None;

        info!(
            component = %self.name,
            total_calls = metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    async fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = Some(Instant::now());

        let mut metrics = self.metrics.lock().await;
        metrics.half_open_calls = 0;

        error!(
            component = %self.name,
            consecutive_failures = metrics.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            open_timeout_secs = self.config.open_timeout.as_secs(),
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    async fn transition_to_half_open(&self) {
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.half_open_calls = 0;

        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );
    }

    /// Force circuit to open state (operational override)
    pub async fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        self.transition_to_open().await;
    }

    /// Force circuit to closed state (operational override)
    pub async fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        self.transition_to_closed().await;
    }

    /// Get current metrics snapshot
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let metrics = self.metrics.lock().await;
        let mut snapshot = metrics.clone();
        snapshot.current_state = self.state();

        if metrics.total_calls > 0 {
            snapshot.failure_rate = metrics.failure_count as f64 / metrics.total_calls as f64;
            snapshot.success_rate = metrics.success_count as f64 / metrics.total_calls as f64;
        }

        snapshot
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    fn settings(failure_threshold: u32, open_timeout: Duration) -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            failure_threshold,
            open_timeout,
            success_threshold: 2,
            call_timeout: Duration::from_secs(1),
            call_retry_attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_normal_operation_stays_closed() {
        let circuit = CircuitBreaker::new(
            "test".to_string(),
            settings(3, Duration::from_millis(100)),
        );
        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics().await;
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_opens_after_failure_threshold() {
        let circuit = CircuitBreaker::new(
            "test".to_string(),
            settings(2, Duration::from_millis(100)),
        );

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        // Next call short-circuits without executing
        let result = circuit
            .call(|| async { Ok::<_, String>("should not execute") })
            .await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_recovery_through_half_open() {
        let mut config = settings(1, Duration::from_millis(50));
        config.success_threshold = 1;
        let circuit = CircuitBreaker::new("test".to_string(), config);

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        sleep(Duration::from_millis(60)).await;

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let mut config = settings(1, Duration::from_millis(20));
        config.success_threshold = 2;
        let circuit = CircuitBreaker::new("test".to_string(), config);

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        sleep(Duration::from_millis(30)).await;

        let _ = circuit.call(|| async { Err::<String, _>("still failing") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = CircuitBreaker::new("test".to_string(), settings(1, Duration::from_secs(1)));

        circuit.force_open().await;
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.force_closed().await;
        assert_eq!(circuit.state(), CircuitState::Closed);
    }
}
