use super::errors::MessagingError;
use super::message::DeadLetterMessage;
use super::queue::MessageQueue;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Publishes permanently failed messages to the dead-letter queue scoped
/// to their source queue (`<source>-dlq`).
#[derive(Clone)]
pub struct DeadLetterPublisher {
    queue: Arc<dyn MessageQueue>,
}

impl DeadLetterPublisher {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }

    /// Dead-letter queue name for a source queue.
    pub fn dlq_name(source_queue: &str) -> String {
        format!("{source_queue}-dlq")
    }

    /// Publish the original payload and last error to the source queue's DLQ.
    pub async fn publish(
        &self,
        source_queue: &str,
        original: serde_json::Value,
        error_message: String,
    ) -> Result<i64, MessagingError> {
        let dlq = Self::dlq_name(source_queue);
        let dead_letter = DeadLetterMessage {
            original,
            error_message,
            source_queue: source_queue.to_string(),
            failed_at: Utc::now(),
        };

        let value = serde_json::to_value(&dead_letter)?;
        match self.queue.send_json(&dlq, &value).await {
            Ok(msg_id) => {
                info!(
                    source_queue = %source_queue,
                    dlq = %dlq,
                    msg_id,
                    "📮 Message routed to dead-letter queue"
                );
                Ok(msg_id)
            }
            Err(e) => {
                warn!(
                    source_queue = %source_queue,
                    dlq = %dlq,
                    error = %e,
                    "Failed to publish dead-letter message"
                );
                Err(e)
            }
        }
    }
}
