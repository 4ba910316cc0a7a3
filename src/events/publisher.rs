use crate::models::InterfaceType;
use crate::state_machine::states::ExceptionStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle events emitted by the store, the state machine and the retry
/// orchestrator. Consumed in-process (cache invalidation, subscriptions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CollectorEvent {
    ExceptionCaptured {
        transaction_id: String,
        interface_type: InterfaceType,
    },
    ExceptionStatusChanged {
        transaction_id: String,
        from: ExceptionStatus,
        to: ExceptionStatus,
    },
    RetryAttemptStarted {
        transaction_id: String,
        attempt_number: i32,
        initiated_by: String,
    },
    RetryAttemptCompleted {
        transaction_id: String,
        attempt_number: i32,
        success: bool,
    },
}

impl CollectorEvent {
    /// Transaction id the event refers to.
    pub fn transaction_id(&self) -> &str {
        match self {
            Self::ExceptionCaptured { transaction_id, .. }
            | Self::ExceptionStatusChanged { transaction_id, .. }
            | Self::RetryAttemptStarted { transaction_id, .. }
            | Self::RetryAttemptCompleted { transaction_id, .. } => transaction_id,
        }
    }

    /// Event type name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ExceptionCaptured { .. } => "exception_captured",
            Self::ExceptionStatusChanged { .. } => "exception_status_changed",
            Self::RetryAttemptStarted { .. } => "retry_attempt_started",
            Self::RetryAttemptCompleted { .. } => "retry_attempt_completed",
        }
    }
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: CollectorEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// High-throughput event publisher for lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Publishing with no subscribers is not an error; lifecycle events are
    /// emitted regardless of whether anyone is listening.
    pub fn publish(&self, event: CollectorEvent) -> Result<(), PublishError> {
        let published = PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        };

        match self.sender.send(published) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        tokio_test::block_on(async {
            let publisher = EventPublisher::new(16);
            let result = publisher.publish(CollectorEvent::ExceptionCaptured {
                transaction_id: "TXN-1".to_string(),
                interface_type: InterfaceType::Order,
            });
            assert!(result.is_ok());
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let publisher = EventPublisher::new(16);
        let mut rx = publisher.subscribe();

        publisher
            .publish(CollectorEvent::RetryAttemptStarted {
                transaction_id: "TXN-2".to_string(),
                attempt_number: 1,
                initiated_by: "ops".to_string(),
            })
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.transaction_id(), "TXN-2");
        assert_eq!(received.event.event_type(), "retry_attempt_started");
    }
}
