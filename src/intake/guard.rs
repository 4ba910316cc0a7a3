use crate::config::IntakeConfig;
use crate::messaging::{DeadLetterPublisher, InboundEvent, MessagingError, QueueMessage};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Failure reported by the downstream domain handler.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProcessingError(pub String);

/// Opaque domain handler invoked once a message decodes and validates.
#[async_trait]
pub trait InboundProcessor: Send + Sync {
    async fn process(&self, event: &InboundEvent) -> Result<(), ProcessingError>;
}

/// Hook invoked when intake retries are exhausted, so the failure is
/// recorded durably as an interface exception.
#[async_trait]
pub trait ExceptionRecorder: Send + Sync {
    async fn record_failure(&self, event: &InboundEvent, error: &str);
}

/// What the guard did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Domain processing succeeded.
    Processed,
    /// The message was routed to the dead-letter queue.
    DeadLettered { reason: String },
}

/// Wraps one queue's message handling with bounded retry and dead-letter
/// fallback.
pub struct IntakeGuard {
    config: IntakeConfig,
    processor: Arc<dyn InboundProcessor>,
    dead_letters: DeadLetterPublisher,
    recorder: Option<Arc<dyn ExceptionRecorder>>,
}

impl IntakeGuard {
    pub fn new(
        config: IntakeConfig,
        processor: Arc<dyn InboundProcessor>,
        dead_letters: DeadLetterPublisher,
        recorder: Option<Arc<dyn ExceptionRecorder>>,
    ) -> Self {
        Self {
            config,
            processor,
            dead_letters,
            recorder,
        }
    }

    /// Handle one raw message.
    ///
    /// Returns `Ok` when the message is finished from the transport's point
    /// of view (processed or dead-lettered) and should be acknowledged.
    /// Only a dead-letter publish failure propagates as `Err`, leaving the
    /// message un-acked for redelivery.
    pub async fn handle_message(
        &self,
        source_queue: &str,
        message: &QueueMessage,
    ) -> Result<IntakeOutcome, MessagingError> {
        // Step 1: decode. A message that cannot be decoded will never
        // succeed, so it goes straight to the DLQ.
        let event: InboundEvent = match serde_json::from_value(message.message.clone()) {
            Ok(event) => event,
            Err(e) => {
                let reason = format!("Failed to decode inbound event: {e}");
                error!(
                    source_queue = %source_queue,
                    msg_id = message.msg_id,
                    error = %e,
                    "Undecodable message routed to DLQ"
                );
                self.dead_letters
                    .publish(source_queue, message.message.clone(), reason.clone())
                    .await?;
                return Ok(IntakeOutcome::DeadLettered { reason });
            }
        };

        // Steps 2-3: validate + process, with fixed-delay retry applied
        // uniformly to both failure kinds.
        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            let result = match Self::validate(&event) {
                Ok(()) => self
                    .processor
                    .process(&event)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    info!(
                        source_queue = %source_queue,
                        transaction_id = %event.transaction_id,
                        attempt,
                        "Inbound event processed"
                    );
                    return Ok(IntakeOutcome::Processed);
                }
                Err(e) => {
                    last_error = e;
                    if attempt < self.config.max_attempts {
                        warn!(
                            source_queue = %source_queue,
                            transaction_id = %event.transaction_id,
                            attempt,
                            max_attempts = self.config.max_attempts,
                            error = %last_error,
                            "Inbound event processing failed, will retry"
                        );
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        error!(
            source_queue = %source_queue,
            transaction_id = %event.transaction_id,
            attempts = self.config.max_attempts,
            error = %last_error,
            "Inbound event processing exhausted retries, routing to DLQ"
        );

        // Dead-letter publish happens-after retry exhaustion; only once it
        // succeeds is the message considered handled.
        self.dead_letters
            .publish(source_queue, message.message.clone(), last_error.clone())
            .await?;

        if let Some(recorder) = &self.recorder {
            recorder.record_failure(&event, &last_error).await;
        }

        Ok(IntakeOutcome::DeadLettered { reason: last_error })
    }

    fn validate(event: &InboundEvent) -> Result<(), String> {
        if event.transaction_id.trim().is_empty() {
            return Err("Invalid inbound event: missing transaction id".to_string());
        }
        if event.operation.trim().is_empty() {
            return Err("Invalid inbound event: missing operation".to_string());
        }
        if event.payload.is_null() {
            return Err("Invalid inbound event: missing payload".to_string());
        }
        Ok(())
    }
}
