//! Order-service client over the managed streaming connection.
//!
//! Every remote call goes through the resilience policy (circuit breaker,
//! timeout, bounded retry) in addition to the connection manager's own
//! reconnect handling; the two layers fail independently.

use super::connection_manager::ConnectionManager;
use super::traits::{ClientError, PayloadResponse, SourceServiceClient, SubmitResult};
use super::transport::TransportError;
use crate::models::{InterfaceException, InterfaceType};
use crate::resilience::policy::PolicyError;
use crate::resilience::ResilientPolicy;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

const SOURCE_SERVICE: &str = "order-service";

pub struct StreamingOrderServiceClient {
    connection: ConnectionManager,
    policy: ResilientPolicy,
}

impl StreamingOrderServiceClient {
    pub fn new(connection: ConnectionManager, policy: ResilientPolicy) -> Self {
        Self { connection, policy }
    }

    /// Logical route carrying the original payload for an order.
    fn payload_route(exception: &InterfaceException) -> String {
        let external_id = exception
            .external_id
            .as_deref()
            .unwrap_or(&exception.transaction_id);
        format!("orders.{external_id}")
    }

    async fn request_route(
        &self,
        route: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, PolicyError<TransportError>> {
        let requester = self.connection.get_requester().await;
        let result = self
            .policy
            .execute(|| async {
                match &requester {
                    Some(handle) => handle.request(route, body.clone()).await,
                    None => Err(TransportError::ConnectionLost(
                        "no active connection".to_string(),
                    )),
                }
            })
            .await;

        if let Err(PolicyError::Operation(e)) = &result {
            self.connection.handle_transport_error(e);
        }
        result
    }
}

#[async_trait]
impl SourceServiceClient for StreamingOrderServiceClient {
    fn interface_type(&self) -> InterfaceType {
        InterfaceType::Order
    }

    async fn get_original_payload(&self, exception: &InterfaceException) -> PayloadResponse {
        if self.connection.is_fallback_mode() {
            let reason = self
                .connection
                .fallback_reason()
                .unwrap_or_else(|| "connection in fallback mode".to_string());
            debug!(
                transaction_id = %exception.transaction_id,
                "Payload not retrieved: fallback mode"
            );
            return PayloadResponse::not_retrieved(
                format!("Payload not retrieved, reason: fallback mode ({reason})"),
                SOURCE_SERVICE,
            );
        }

        if !self.connection.is_connection_available().await {
            return PayloadResponse::not_retrieved(
                "Payload not retrieved, reason: connection unavailable",
                SOURCE_SERVICE,
            );
        }

        let route = Self::payload_route(exception);
        let body = json!({
            "transactionId": exception.transaction_id,
            "operation": exception.operation,
        });

        match self.request_route(&route, body).await {
            Ok(payload) => {
                debug!(
                    transaction_id = %exception.transaction_id,
                    route = %route,
                    "Original payload retrieved"
                );
                PayloadResponse::retrieved(payload, SOURCE_SERVICE)
            }
            Err(e) => {
                warn!(
                    transaction_id = %exception.transaction_id,
                    route = %route,
                    error = %e,
                    "Original payload retrieval failed"
                );
                PayloadResponse::not_retrieved(
                    format!("Payload not retrieved, reason: {e}"),
                    SOURCE_SERVICE,
                )
            }
        }
    }

    async fn submit_retry(
        &self,
        exception: &InterfaceException,
        payload: &serde_json::Value,
    ) -> Result<SubmitResult, ClientError> {
        if self.connection.is_fallback_mode() {
            return Err(ClientError::Unavailable(
                "connection in fallback mode".to_string(),
            ));
        }

        let body = json!({
            "transactionId": exception.transaction_id,
            "operation": exception.operation,
            "payload": payload,
        });

        match self.request_route("orders.submit", body).await {
            Ok(response) => {
                let status_code = response
                    .get("statusCode")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(200) as u16;
                Ok(SubmitResult {
                    status_code,
                    body: Some(response),
                })
            }
            Err(PolicyError::CircuitOpen { component }) => Err(ClientError::Unavailable(format!(
                "circuit breaker open for {component}"
            ))),
            Err(PolicyError::Timeout(d)) => {
                Err(ClientError::Transport(format!("call timed out after {d:?}")))
            }
            Err(PolicyError::Operation(e)) => Err(ClientError::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::config::{CircuitBreakerSettings, ConnectionConfig};
    use crate::resilience::CircuitBreaker;
    use crate::test_helpers::factories::captured_exception;
    use crate::test_helpers::mock_transport::MockStreamingTransport;
    use std::time::Duration;

    fn policy() -> ResilientPolicy {
        ResilientPolicy::new(
            Arc::new(CircuitBreaker::new(
                "order-service".to_string(),
                CircuitBreakerSettings {
                    failure_threshold: 5,
                    open_timeout: Duration::from_secs(30),
                    success_threshold: 1,
                    call_timeout: Duration::from_millis(200),
                    call_retry_attempts: 1,
                },
            )),
            Duration::from_millis(200),
            1,
        )
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            host: "localhost".to_string(),
            port: 7000,
            request_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(200),
            keep_alive_interval: Duration::from_secs(20),
            keep_alive_max_lifetime: Duration::from_secs(90),
            connect_max_attempts: 1,
            connect_backoff_base: Duration::from_millis(5),
            connect_backoff_max: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_payload_retrieval_over_connection() {
        let transport = Arc::new(
            MockStreamingTransport::healthy()
                .with_route_response("orders.EXT-1", json!({"orderId": "EXT-1", "items": []})),
        );
        let manager = ConnectionManager::new(config(), transport);
        manager.establish_connection().await.unwrap();

        let client = StreamingOrderServiceClient::new(manager, policy());
        let exception = captured_exception("TXN-1", Some("EXT-1"));

        let response = client.get_original_payload(&exception).await;
        assert!(response.retrieved);
        assert_eq!(response.payload.unwrap()["orderId"], "EXT-1");
        assert_eq!(response.source_service, "order-service");
    }

    #[tokio::test]
    async fn test_fallback_mode_yields_degraded_response() {
        let transport = Arc::new(MockStreamingTransport::refusing());
        let manager = ConnectionManager::new(config(), transport);
        let _ = manager.establish_connection().await;
        assert!(manager.is_fallback_mode());

        let client = StreamingOrderServiceClient::new(manager, policy());
        let exception = captured_exception("TXN-1", Some("EXT-1"));

        let response = client.get_original_payload(&exception).await;
        assert!(!response.retrieved);
        assert!(response.error_message.unwrap().contains("fallback"));
    }

    #[tokio::test]
    async fn test_submit_retry_reports_status() {
        let transport = Arc::new(
            MockStreamingTransport::healthy()
                .with_route_response("orders.submit", json!({"statusCode": 201})),
        );
        let manager = ConnectionManager::new(config(), transport);
        manager.establish_connection().await.unwrap();

        let client = StreamingOrderServiceClient::new(manager, policy());
        let exception = captured_exception("TXN-1", Some("EXT-1"));

        let result = client
            .submit_retry(&exception, &json!({"orderId": "EXT-1"}))
            .await
            .unwrap();
        assert_eq!(result.status_code, 201);
        assert!(result.is_success());
    }
}
