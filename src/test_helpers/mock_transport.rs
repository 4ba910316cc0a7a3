//! Scriptable in-memory streaming transport.

use crate::client::transport::{RequesterHandle, StreamingTransport, TransportError};
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Handle returned by [`MockStreamingTransport`].
pub struct MockRequesterHandle {
    disposed: AtomicBool,
    fail_health: bool,
    drop_requests: Arc<AtomicBool>,
    routes: Arc<DashMap<String, serde_json::Value>>,
}

#[async_trait]
impl RequesterHandle for MockRequesterHandle {
    async fn request(
        &self,
        route: &str,
        _payload: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        if self.is_disposed() {
            return Err(TransportError::Disposed);
        }
        if self.drop_requests.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionLost(
                "simulated connection drop".to_string(),
            ));
        }
        match self.routes.get(route) {
            Some(value) => Ok(value.clone()),
            None => Err(TransportError::Route {
                route: route.to_string(),
                message: "no responder for route".to_string(),
            }),
        }
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        if self.fail_health {
            Err(TransportError::Route {
                route: "health".to_string(),
                message: "health route not available".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Transport whose connect/request behavior tests can flip at runtime.
pub struct MockStreamingTransport {
    refuse_connections: AtomicBool,
    fail_health: AtomicBool,
    drop_requests: Arc<AtomicBool>,
    connect_attempts: AtomicU32,
    routes: Arc<DashMap<String, serde_json::Value>>,
}

impl MockStreamingTransport {
    /// Transport that accepts connections and answers configured routes.
    pub fn healthy() -> Self {
        Self {
            refuse_connections: AtomicBool::new(false),
            fail_health: AtomicBool::new(false),
            drop_requests: Arc::new(AtomicBool::new(false)),
            connect_attempts: AtomicU32::new(0),
            routes: Arc::new(DashMap::new()),
        }
    }

    /// Transport that refuses every connection attempt.
    pub fn refusing() -> Self {
        let transport = Self::healthy();
        transport.refuse_connections.store(true, Ordering::Release);
        transport
    }

    pub fn with_failing_health_probe(self) -> Self {
        self.fail_health.store(true, Ordering::Release);
        self
    }

    pub fn with_route_response(self, route: &str, response: serde_json::Value) -> Self {
        self.routes.insert(route.to_string(), response);
        self
    }

    pub fn set_route_response(&self, route: &str, response: serde_json::Value) {
        self.routes.insert(route.to_string(), response);
    }

    pub fn refuse_further_connections(&self) {
        self.refuse_connections.store(true, Ordering::Release);
    }

    pub fn accept_connections(&self) {
        self.refuse_connections.store(false, Ordering::Release);
    }

    /// Make in-flight handles fail with a connection loss.
    pub fn drop_connection(&self) {
        self.drop_requests.store(true, Ordering::Release);
    }

    pub fn restore_connection(&self) {
        self.drop_requests.store(false, Ordering::Release);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl StreamingTransport for MockStreamingTransport {
    async fn connect(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Arc<dyn RequesterHandle>, TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::AcqRel);

        if self.refuse_connections.load(Ordering::Acquire) {
            return Err(TransportError::ConnectFailed(
                "connection refused".to_string(),
            ));
        }

        Ok(Arc::new(MockRequesterHandle {
            disposed: AtomicBool::new(false),
            fail_health: self.fail_health.load(Ordering::Acquire),
            drop_requests: self.drop_requests.clone(),
            routes: self.routes.clone(),
        }))
    }
}
