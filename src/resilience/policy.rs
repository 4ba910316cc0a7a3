//! Explicit resilience decorator for remote calls.
//!
//! Composes per-call timeout, bounded retry and a named circuit breaker
//! around an async operation. This is a plain function-wrapping-a-function
//! construction, configurable per policy and testable without any
//! framework wiring.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Failure modes of a policy-wrapped call.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError<E> {
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    #[error("Call failed: {0}")]
    Operation(E),
}

#[derive(Debug)]
enum CallError<E> {
    Timeout,
    Operation(E),
}

/// Timeout + retry + circuit breaker around one remote operation.
#[derive(Clone)]
pub struct ResilientPolicy {
    breaker: Arc<CircuitBreaker>,
    call_timeout: Duration,
    retry_attempts: u32,
}

impl ResilientPolicy {
    pub fn new(breaker: Arc<CircuitBreaker>, call_timeout: Duration, retry_attempts: u32) -> Self {
        Self {
            breaker,
            call_timeout,
            retry_attempts,
        }
    }

    /// Execute the operation under this policy.
    ///
    /// The operation closure is re-invoked on retry; each invocation is
    /// individually bounded by the call timeout and recorded against the
    /// circuit breaker. An open circuit stops the retry loop immediately —
    /// retrying a short-circuited call would only generate noise.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, PolicyError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error: Option<PolicyError<E>> = None;

        for attempt in 0..=self.retry_attempts {
            let result = self
                .breaker
                .call(|| async {
                    match tokio::time::timeout(self.call_timeout, operation()).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(CallError::Operation(e)),
                        Err(_) => Err(CallError::Timeout),
                    }
                })
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(CircuitBreakerError::CircuitOpen { component }) => {
                    return Err(PolicyError::CircuitOpen { component });
                }
                Err(CircuitBreakerError::OperationFailed(CallError::Timeout)) => {
                    warn!(
                        component = self.breaker.name(),
                        attempt,
                        timeout_ms = self.call_timeout.as_millis(),
                        "Remote call timed out"
                    );
                    last_error = Some(PolicyError::Timeout(self.call_timeout));
                }
                Err(CircuitBreakerError::OperationFailed(CallError::Operation(e))) => {
                    warn!(
                        component = self.breaker.name(),
                        attempt,
                        error = %e,
                        "Remote call failed"
                    );
                    last_error = Some(PolicyError::Operation(e));
                }
            }
        }

        // The loop always runs at least once, so an error is recorded.
        Err(last_error.unwrap_or(PolicyError::Timeout(self.call_timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerSettings;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(failure_threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "test".to_string(),
            CircuitBreakerSettings {
                failure_threshold,
                open_timeout: Duration::from_secs(60),
                success_threshold: 1,
                call_timeout: Duration::from_secs(1),
                call_retry_attempts: 0,
            },
        ))
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = ResilientPolicy::new(breaker(10), Duration::from_secs(1), 3);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let policy = ResilientPolicy::new(breaker(10), Duration::from_secs(1), 2);
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>("permanent".to_string())
            })
            .await;

        assert!(matches!(result, Err(PolicyError::Operation(ref e)) if e == "permanent"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_without_calling() {
        let breaker = breaker(1);
        let policy = ResilientPolicy::new(breaker.clone(), Duration::from_secs(1), 5);

        // Trip the breaker
        let _: Result<u32, _> = policy.execute(|| async { Err("boom".to_string()) }).await;

        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, String>(1)
            })
            .await;

        assert!(matches!(result, Err(PolicyError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let policy = ResilientPolicy::new(breaker(10), Duration::from_millis(20), 0);

        let result: Result<u32, PolicyError<String>> = policy
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;

        assert!(matches!(result, Err(PolicyError::Timeout(_))));
    }
}
