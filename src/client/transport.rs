use crate::config::ConnectionConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Errors raised by the streaming transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Route {route} failed: {message}")]
    Route { route: String, message: String },

    #[error("Requester has been disposed")]
    Disposed,
}

impl TransportError {
    /// Whether this error means the underlying connection is gone, as
    /// opposed to an application-level failure on a healthy channel. The
    /// distinction drives reconnection: only transport drops do.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed(_) | Self::ConnectionLost(_) | Self::Disposed
        )
    }
}

/// Live handle to one established streaming connection.
#[async_trait]
pub trait RequesterHandle: Send + Sync {
    /// Issue a request-response interaction on a logical route
    /// (e.g. `orders.<externalId>`).
    async fn request(
        &self,
        route: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;

    /// Best-effort health probe. The remote may not expose a health route.
    async fn health_check(&self) -> Result<(), TransportError>;

    /// Release transport resources. Idempotent.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// Factory opening streaming connections to a source service.
#[async_trait]
pub trait StreamingTransport: Send + Sync {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn RequesterHandle>, TransportError>;
}
