//! TCP streaming transport.
//!
//! Newline-delimited JSON request/response over one long-lived socket:
//! each request is a single line `{"route": ..., "payload": ...}` and the
//! peer answers with a single JSON line. Requests are serialized over the
//! connection; the manager layer above decides when to reconnect.

use super::transport::{RequesterHandle, StreamingTransport, TransportError};
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

struct TcpRequesterHandle {
    disposed: AtomicBool,
    stream: Mutex<Option<(BufReader<OwnedReadHalf>, OwnedWriteHalf)>>,
}

#[async_trait]
impl RequesterHandle for TcpRequesterHandle {
    async fn request(
        &self,
        route: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        if self.is_disposed() {
            return Err(TransportError::Disposed);
        }

        let mut guard = self.stream.lock().await;
        let Some((reader, writer)) = guard.as_mut() else {
            return Err(TransportError::Disposed);
        };

        let frame = json!({ "route": route, "payload": payload });
        let mut line = frame.to_string();
        line.push('\n');

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;

        let mut response = String::new();
        let read = reader
            .read_line(&mut response)
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        if read == 0 {
            return Err(TransportError::ConnectionLost(
                "peer closed the connection".to_string(),
            ));
        }

        let value: serde_json::Value =
            serde_json::from_str(response.trim()).map_err(|e| TransportError::Route {
                route: route.to_string(),
                message: format!("invalid response frame: {e}"),
            })?;

        // An error frame is an application-level failure on a healthy
        // connection, not a transport drop.
        if let Some(error) = value.get("error").and_then(serde_json::Value::as_str) {
            return Err(TransportError::Route {
                route: route.to_string(),
                message: error.to_string(),
            });
        }

        Ok(value)
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        self.request("health", serde_json::Value::Null)
            .await
            .map(|_| ())
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        // Socket halves are dropped lazily on the next lock; marking
        // disposed is enough for correctness.
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Transport opening TCP connections per the connection configuration.
#[derive(Default)]
pub struct TcpStreamingTransport;

impl TcpStreamingTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamingTransport for TcpStreamingTransport {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn RequesterHandle>, TransportError> {
        let address = format!("{}:{}", config.host, config.port);
        debug!(address = %address, "Opening TCP streaming connection");

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                TransportError::ConnectFailed(format!("connect to {address} timed out"))
            })?
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (read_half, write_half) = stream.into_split();
        Ok(Arc::new(TcpRequesterHandle {
            disposed: AtomicBool::new(false),
            stream: Mutex::new(Some((BufReader::new(read_half), write_half))),
        }))
    }
}
