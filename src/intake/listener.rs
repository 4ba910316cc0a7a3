use super::guard::{IntakeGuard, IntakeOutcome};
use crate::config::IntakeConfig;
use crate::messaging::{MessageQueue, MessagingError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Polls one source queue and runs every message through the intake guard.
///
/// Successful and dead-lettered messages are acknowledged (deleted); a
/// message whose dead-letter publish failed is left in flight so the
/// queue redelivers it after the visibility timeout.
pub struct QueueListener {
    queue_name: String,
    queue: Arc<dyn MessageQueue>,
    guard: Arc<IntakeGuard>,
    config: IntakeConfig,
    poll_interval: Duration,
    shutdown: AtomicBool,
}

impl QueueListener {
    pub fn new(
        queue_name: impl Into<String>,
        queue: Arc<dyn MessageQueue>,
        guard: Arc<IntakeGuard>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            queue,
            guard,
            config,
            poll_interval: Duration::from_millis(500),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Request the polling loop to stop after the in-flight message.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Read and handle at most one message. Returns the guard outcome, or
    /// `None` when the queue was empty.
    pub async fn poll_once(&self) -> Result<Option<IntakeOutcome>, MessagingError> {
        let Some(message) = self
            .queue
            .read(&self.queue_name, Some(self.config.visibility_timeout_secs))
            .await?
        else {
            return Ok(None);
        };

        debug!(
            queue = %self.queue_name,
            msg_id = message.msg_id,
            read_count = message.read_count,
            "Read inbound message"
        );

        match self.guard.handle_message(&self.queue_name, &message).await {
            Ok(outcome) => {
                self.queue.delete(&self.queue_name, message.msg_id).await?;
                Ok(Some(outcome))
            }
            Err(e) => {
                // Leave un-acked; the broker redelivers after the
                // visibility timeout.
                warn!(
                    queue = %self.queue_name,
                    msg_id = message.msg_id,
                    error = %e,
                    "Message handling incomplete, leaving for redelivery"
                );
                Err(e)
            }
        }
    }

    /// Run the polling loop until shutdown is requested.
    pub async fn run(&self) {
        info!(queue = %self.queue_name, "📡 Queue listener started");
        while !self.shutdown.load(Ordering::Acquire) {
            match self.poll_once().await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    warn!(queue = %self.queue_name, error = %e, "Queue poll failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        info!(queue = %self.queue_name, "Queue listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::guard::{InboundProcessor, ProcessingError};
    use crate::messaging::{DeadLetterPublisher, InMemoryQueue, InboundEvent};
    use crate::models::InterfaceType;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    struct OkProcessor;

    #[async_trait]
    impl InboundProcessor for OkProcessor {
        async fn process(&self, _event: &InboundEvent) -> Result<(), ProcessingError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_poll_once_processes_and_acks() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.create_queue("orders-events").await.unwrap();

        let config = IntakeConfig {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1),
            visibility_timeout_secs: 30,
        };
        let guard = Arc::new(IntakeGuard::new(
            config.clone(),
            Arc::new(OkProcessor),
            DeadLetterPublisher::new(queue.clone()),
            None,
        ));
        let listener = QueueListener::new("orders-events", queue.clone(), guard, config);

        let event = InboundEvent {
            transaction_id: "TXN-1".to_string(),
            external_id: None,
            interface_type: InterfaceType::Order,
            operation: "CREATE_ORDER".to_string(),
            payload: json!({"orderId": 9}),
            customer_id: None,
            location_code: None,
            occurred_at: Utc::now(),
        };
        queue
            .send_json("orders-events", &serde_json::to_value(&event).unwrap())
            .await
            .unwrap();

        let outcome = listener.poll_once().await.unwrap();
        assert_eq!(outcome, Some(IntakeOutcome::Processed));

        // Acked: nothing comes back even after a visibility timeout
        queue.requeue_in_flight("orders-events").await;
        assert!(queue.is_empty("orders-events").await);
        assert_eq!(listener.poll_once().await.unwrap(), None);
    }
}
