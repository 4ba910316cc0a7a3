use crate::config::RetryConfig;
use crate::events::{CollectorEvent, EventPublisher};
use crate::intake::{ExceptionRecorder, InboundProcessor, ProcessingError};
use crate::messaging::InboundEvent;
use crate::models::{ExceptionCategory, ExceptionSeverity, NewInterfaceException};
use crate::store::{ExceptionStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Creates the durable `InterfaceException` record once intake retries
/// are exhausted for an event.
pub struct ExceptionCaptureService {
    store: Arc<dyn ExceptionStore>,
    event_publisher: EventPublisher,
    config: RetryConfig,
}

impl ExceptionCaptureService {
    pub fn new(
        store: Arc<dyn ExceptionStore>,
        event_publisher: EventPublisher,
        config: RetryConfig,
    ) -> Self {
        Self {
            store,
            event_publisher,
            config,
        }
    }

    fn classify(error: &str) -> (ExceptionCategory, ExceptionSeverity) {
        let lower = error.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            (ExceptionCategory::Timeout, ExceptionSeverity::High)
        } else if lower.contains("connect") || lower.contains("network") {
            (ExceptionCategory::Network, ExceptionSeverity::High)
        } else if lower.contains("invalid") || lower.contains("validation") {
            (ExceptionCategory::Validation, ExceptionSeverity::Medium)
        } else {
            (ExceptionCategory::SystemError, ExceptionSeverity::Medium)
        }
    }

    /// Capture one failed event as an exception record.
    pub async fn capture(&self, event: &InboundEvent, error: &str) -> Result<(), StoreError> {
        let (category, severity) = Self::classify(error);

        let created = self
            .store
            .insert(NewInterfaceException {
                transaction_id: event.transaction_id.clone(),
                external_id: event.external_id.clone(),
                interface_type: event.interface_type,
                operation: event.operation.clone(),
                exception_reason: error.to_string(),
                severity,
                category,
                retryable: true,
                max_retries: self.config.default_max_retries,
                customer_id: event.customer_id.clone(),
                location_code: event.location_code.clone(),
                timestamp: event.occurred_at,
            })
            .await?;

        info!(
            transaction_id = %created.transaction_id,
            interface_type = %created.interface_type,
            severity = %created.severity,
            "📋 Interface exception captured"
        );

        let _ = self.event_publisher.publish(CollectorEvent::ExceptionCaptured {
            transaction_id: created.transaction_id,
            interface_type: created.interface_type,
        });

        Ok(())
    }
}

/// Inbound exception events from sibling services are processed by
/// capturing them; a redelivered event for an already captured failure is
/// treated as success.
#[async_trait]
impl InboundProcessor for ExceptionCaptureService {
    async fn process(&self, event: &InboundEvent) -> Result<(), ProcessingError> {
        let reason = event
            .payload
            .get("reason")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("failure reported by source service");

        match self.capture(event, reason).await {
            Ok(()) => Ok(()),
            Err(StoreError::DuplicateTransaction(_)) => Ok(()),
            Err(e) => Err(ProcessingError(e.to_string())),
        }
    }
}

#[async_trait]
impl ExceptionRecorder for ExceptionCaptureService {
    async fn record_failure(&self, event: &InboundEvent, error: &str) {
        match self.capture(event, error).await {
            Ok(()) => {}
            Err(StoreError::DuplicateTransaction(txn)) => {
                // Redelivered message for an already captured failure.
                debug!(transaction_id = %txn, "Exception already captured, skipping");
            }
            Err(e) => {
                error!(
                    transaction_id = %event.transaction_id,
                    error = %e,
                    "Failed to capture interface exception"
                );
            }
        }
    }
}
