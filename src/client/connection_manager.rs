//! # Connection Resilience Manager
//!
//! Owns the lifecycle of the long-lived streaming connection to a source
//! service: establish with validation and keep-alive, best-effort health
//! probing, automatic reconnection with backoff, explicit fallback mode,
//! forced reconnection and status reporting.
//!
//! Two distinct retry policies apply on purpose: connection establishment
//! retries 3 times with exponential backoff (1s base, 10s ceiling), while
//! an unexpected disconnect schedules its first reattempt after a fixed
//! 5s delay and then backs off the same way, bounded by
//! `max_reconnect_attempts` before settling into fallback.

use super::transport::{RequesterHandle, StreamingTransport, TransportError};
use crate::config::ConnectionConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Errors surfaced by connection management operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid connection configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to establish connection: {0}")]
    EstablishFailed(String),
}

/// Point-in-time connection status, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub fallback_mode: bool,
    pub requester_available: bool,
    pub host: String,
    pub port: u16,
}

struct ManagerInner {
    config: ConnectionConfig,
    transport: Arc<dyn StreamingTransport>,
    active_requester: RwLock<Option<Arc<dyn RequesterHandle>>>,
    connected: AtomicBool,
    fallback_mode: AtomicBool,
    shutting_down: AtomicBool,
    /// Guards against overlapping reconnect tasks.
    reconnect_in_flight: AtomicBool,
    fallback_reason: Mutex<Option<String>>,
}

/// Resilient manager for one streaming connection. Cheap to clone; all
/// clones share the same connection state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, transport: Arc<dyn StreamingTransport>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                transport,
                active_requester: RwLock::new(None),
                connected: AtomicBool::new(false),
                fallback_mode: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                reconnect_in_flight: AtomicBool::new(false),
                fallback_reason: Mutex::new(None),
            }),
        }
    }

    /// Establish the connection, retrying with exponential backoff before
    /// settling into fallback mode.
    pub async fn establish_connection(&self) -> Result<(), ConnectionError> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            debug!("Shutting down, skipping connection establishment");
            return Ok(());
        }

        self.validate_configuration()?;

        let max_attempts = self.inner.config.connect_max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        host = %self.inner.config.host,
                        port = self.inner.config.port,
                        attempt,
                        max_attempts,
                        error = %last_error,
                        "Connection attempt failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        let reason = format!("Connection establishment failed: {last_error}");
        self.enable_fallback_mode(&reason);
        Err(ConnectionError::EstablishFailed(last_error))
    }

    /// One transport connect + health probe + handle swap.
    async fn connect_once(&self) -> Result<(), TransportError> {
        let requester = self.inner.transport.connect(&self.inner.config).await?;

        // Best-effort probe: the source service may simply not expose a
        // health route, so a failure here never aborts establishment.
        match tokio::time::timeout(self.inner.config.request_timeout, requester.health_check())
            .await
        {
            Ok(Ok(())) => debug!("Connection health probe succeeded"),
            Ok(Err(e)) => {
                warn!(error = %e, "Connection health probe failed, but connection may still be usable")
            }
            Err(_) => warn!("Connection health probe timed out, but connection may still be usable"),
        }

        // Swap in the new handle and dispose the previous one.
        let previous = {
            let mut active = self.inner.active_requester.write().await;
            active.replace(requester)
        };
        if let Some(previous) = previous {
            if !previous.is_disposed() {
                previous.dispose();
            }
        }

        self.inner.connected.store(true, Ordering::Release);
        self.inner.fallback_mode.store(false, Ordering::Release);
        *self.inner.fallback_reason.lock() = None;

        info!(
            host = %self.inner.config.host,
            port = self.inner.config.port,
            "🔌 Streaming connection established"
        );
        Ok(())
    }

    fn validate_configuration(&self) -> Result<(), ConnectionError> {
        let config = &self.inner.config;
        if config.host.trim().is_empty() {
            return Err(ConnectionError::InvalidConfiguration(
                "host cannot be empty".to_string(),
            ));
        }
        if config.port == 0 {
            return Err(ConnectionError::InvalidConfiguration(format!(
                "port must be between 1 and 65535, got: {}",
                config.port
            )));
        }
        if config.request_timeout.is_zero() {
            return Err(ConnectionError::InvalidConfiguration(
                "request timeout must be positive".to_string(),
            ));
        }
        if config.connect_timeout.is_zero() {
            return Err(ConnectionError::InvalidConfiguration(
                "connect timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.inner.config.connect_backoff_base;
        let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.inner.config.connect_backoff_max)
    }

    /// Report a transport-level failure observed on the active handle.
    ///
    /// Application errors on a healthy channel must not tear the
    /// connection down; only connection errors mark it disconnected and
    /// schedule reconnection.
    pub fn handle_transport_error(&self, error: &TransportError) {
        if !error.is_connection_error() {
            return;
        }

        warn!(error = %error, "Streaming connection lost");
        self.inner.connected.store(false, Ordering::Release);
        self.schedule_reconnection();
    }

    /// Schedule a reconnection attempt after the configured fixed delay.
    /// Reconnect tasks never overlap.
    fn schedule_reconnection(&self) {
        if self.inner.shutting_down.load(Ordering::Acquire)
            || self.inner.fallback_mode.load(Ordering::Acquire)
        {
            return;
        }

        if self
            .inner
            .reconnect_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reconnection already scheduled, skipping");
            return;
        }

        let manager = self.clone();
        info!(
            delay_secs = self.inner.config.reconnect_delay.as_secs(),
            "Scheduling streaming reconnection"
        );

        tokio::spawn(async move {
            tokio::time::sleep(manager.inner.config.reconnect_delay).await;

            let max_attempts = manager.inner.config.max_reconnect_attempts.max(1);
            let mut reconnected = false;

            for attempt in 1..=max_attempts {
                if manager.inner.shutting_down.load(Ordering::Acquire) {
                    break;
                }
                if manager.inner.connected.load(Ordering::Acquire) {
                    reconnected = true;
                    break;
                }

                info!(attempt, max_attempts, "Attempting streaming reconnection");
                match manager.connect_once().await {
                    Ok(()) => {
                        reconnected = true;
                        break;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Reconnection attempt failed");
                        if attempt < max_attempts {
                            tokio::time::sleep(manager.backoff_delay(attempt)).await;
                        }
                    }
                }
            }

            if !reconnected && !manager.inner.shutting_down.load(Ordering::Acquire) {
                manager.enable_fallback_mode("Reconnection attempts exhausted");
            }
            manager
                .inner
                .reconnect_in_flight
                .store(false, Ordering::Release);
        });
    }

    fn enable_fallback_mode(&self, reason: &str) {
        self.inner.fallback_mode.store(true, Ordering::Release);
        self.inner.connected.store(false, Ordering::Release);
        *self.inner.fallback_reason.lock() = Some(reason.to_string());

        warn!(reason = %reason, "⚠️ Fallback mode enabled for streaming operations");
        info!("Payload retrieval will be skipped, but exception processing continues");
    }

    /// Get the active requester, only when connected and not disposed.
    /// Never errors; callers treat `None` as "unavailable".
    pub async fn get_requester(&self) -> Option<Arc<dyn RequesterHandle>> {
        if !self.inner.connected.load(Ordering::Acquire) {
            return None;
        }
        let active = self.inner.active_requester.read().await;
        active.as_ref().filter(|r| !r.is_disposed()).cloned()
    }

    pub async fn is_connection_available(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
            && !self.inner.fallback_mode.load(Ordering::Acquire)
            && self.get_requester().await.is_some()
    }

    pub fn is_fallback_mode(&self) -> bool {
        self.inner.fallback_mode.load(Ordering::Acquire)
    }

    pub fn fallback_reason(&self) -> Option<String> {
        self.inner.fallback_reason.lock().clone()
    }

    /// Dispose any current connection, reset state and re-attempt
    /// establishment. Establishment failure surfaces as fallback mode,
    /// not as an error.
    pub async fn force_reconnect(&self) {
        info!("Forcing streaming reconnection");

        let previous = {
            let mut active = self.inner.active_requester.write().await;
            active.take()
        };
        if let Some(previous) = previous {
            if !previous.is_disposed() {
                previous.dispose();
            }
        }

        self.inner.connected.store(false, Ordering::Release);
        self.inner.fallback_mode.store(false, Ordering::Release);
        *self.inner.fallback_reason.lock() = None;

        if let Err(e) = self.establish_connection().await {
            error!(error = %e, "Forced reconnection failed");
        }
    }

    /// Current status snapshot.
    pub async fn get_connection_status(&self) -> ConnectionStatus {
        let requester_available = {
            let active = self.inner.active_requester.read().await;
            active.as_ref().is_some_and(|r| !r.is_disposed())
        };

        ConnectionStatus {
            connected: self.inner.connected.load(Ordering::Acquire),
            fallback_mode: self.inner.fallback_mode.load(Ordering::Acquire),
            requester_available,
            host: self.inner.config.host.clone(),
            port: self.inner.config.port,
        }
    }

    /// Gracefully shut down, disposing the active connection.
    pub async fn shutdown(&self) {
        info!("Shutting down connection manager");
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.connected.store(false, Ordering::Release);

        let active = self.inner.active_requester.read().await;
        if let Some(requester) = active.as_ref() {
            if !requester.is_disposed() {
                requester.dispose();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::mock_transport::MockStreamingTransport;

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            host: "localhost".to_string(),
            port: 7000,
            request_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(200),
            keep_alive_interval: Duration::from_secs(20),
            keep_alive_max_lifetime: Duration::from_secs(90),
            connect_max_attempts: 3,
            connect_backoff_base: Duration::from_millis(5),
            connect_backoff_max: Duration::from_millis(20),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_establish_connection_success() {
        let transport = Arc::new(MockStreamingTransport::healthy());
        let manager = ConnectionManager::new(test_config(), transport);

        manager.establish_connection().await.unwrap();

        assert!(manager.is_connection_available().await);
        assert!(!manager.is_fallback_mode());
        let status = manager.get_connection_status().await;
        assert!(status.connected);
        assert!(status.requester_available);
        assert_eq!(status.port, 7000);
    }

    #[tokio::test]
    async fn test_invalid_configuration_rejected() {
        let transport = Arc::new(MockStreamingTransport::healthy());
        let mut config = test_config();
        config.host = "  ".to_string();
        let manager = ConnectionManager::new(config, transport);

        let result = manager.establish_connection().await;
        assert!(matches!(
            result,
            Err(ConnectionError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_enters_fallback() {
        let transport = Arc::new(MockStreamingTransport::refusing());
        let manager = ConnectionManager::new(test_config(), transport.clone());

        let result = manager.establish_connection().await;
        assert!(matches!(result, Err(ConnectionError::EstablishFailed(_))));
        assert!(manager.is_fallback_mode());
        assert!(!manager.is_connection_available().await);
        assert!(manager.fallback_reason().is_some());
        // All three configured attempts were made
        assert_eq!(transport.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_health_probe_failure_does_not_abort() {
        let transport = Arc::new(MockStreamingTransport::healthy().with_failing_health_probe());
        let manager = ConnectionManager::new(test_config(), transport);

        manager.establish_connection().await.unwrap();
        assert!(manager.is_connection_available().await);
    }

    #[tokio::test]
    async fn test_disconnect_triggers_reconnection() {
        let transport = Arc::new(MockStreamingTransport::healthy());
        let manager = ConnectionManager::new(test_config(), transport.clone());
        manager.establish_connection().await.unwrap();

        manager.handle_transport_error(&TransportError::ConnectionLost("reset".to_string()));
        assert!(!manager.is_connection_available().await);

        // Reconnect runs after the fixed delay; poll until it lands.
        for _ in 0..100 {
            if manager.is_connection_available().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(manager.is_connection_available().await);
        assert!(!manager.is_fallback_mode());
        assert!(transport.connect_attempts() >= 2);
    }

    #[tokio::test]
    async fn test_application_error_does_not_disconnect() {
        let transport = Arc::new(MockStreamingTransport::healthy());
        let manager = ConnectionManager::new(test_config(), transport);
        manager.establish_connection().await.unwrap();

        manager.handle_transport_error(&TransportError::Route {
            route: "orders.X".to_string(),
            message: "not found".to_string(),
        });
        assert!(manager.is_connection_available().await);
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion_settles_into_fallback() {
        let transport = Arc::new(MockStreamingTransport::healthy());
        let manager = ConnectionManager::new(test_config(), transport.clone());
        manager.establish_connection().await.unwrap();

        transport.refuse_further_connections();
        manager.handle_transport_error(&TransportError::ConnectionLost("reset".to_string()));

        for _ in 0..200 {
            if manager.is_fallback_mode() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(manager.is_fallback_mode());
        assert!(!manager.is_connection_available().await);
    }

    #[tokio::test]
    async fn test_force_reconnect_clears_fallback() {
        let transport = Arc::new(MockStreamingTransport::refusing());
        let manager = ConnectionManager::new(test_config(), transport.clone());

        let _ = manager.establish_connection().await;
        assert!(manager.is_fallback_mode());

        transport.accept_connections();
        manager.force_reconnect().await;

        assert!(!manager.is_fallback_mode());
        assert!(manager.is_connection_available().await);
    }

    #[tokio::test]
    async fn test_get_requester_unavailable_when_disconnected() {
        let transport = Arc::new(MockStreamingTransport::healthy());
        let manager = ConnectionManager::new(test_config(), transport);

        assert!(manager.get_requester().await.is_none());

        manager.establish_connection().await.unwrap();
        assert!(manager.get_requester().await.is_some());

        manager.shutdown().await;
        assert!(manager.get_requester().await.is_none());
    }
}
