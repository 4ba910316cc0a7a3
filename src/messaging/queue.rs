use super::errors::MessagingError;
use super::message::QueueMessage;
use async_trait::async_trait;

/// Transport seam for queue operations.
///
/// Implementations must provide at-least-once delivery: a message read but
/// not deleted becomes visible again after the visibility timeout.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Create the queue if it does not exist.
    async fn create_queue(&self, queue_name: &str) -> Result<(), MessagingError>;

    /// Enqueue a JSON message, returning its id.
    async fn send_json(
        &self,
        queue_name: &str,
        message: &serde_json::Value,
    ) -> Result<i64, MessagingError>;

    /// Read one message, making it invisible for `visibility_timeout` seconds.
    async fn read(
        &self,
        queue_name: &str,
        visibility_timeout: Option<i32>,
    ) -> Result<Option<QueueMessage>, MessagingError>;

    /// Delete a message (successful processing acknowledgment).
    async fn delete(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError>;

    /// Archive a message instead of deleting it.
    async fn archive(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError>;
}
