//! # PostgreSQL Message Queue Client (pgmq-rs)
//!
//! Queue transport over the pgmq-rs crate.

use super::errors::MessagingError;
use super::message::QueueMessage;
use super::queue::MessageQueue;
use async_trait::async_trait;
use pgmq::PGMQueue;
use tracing::{debug, info};

/// pgmq-rs backed queue client
#[derive(Clone)]
pub struct PgmqClient {
    pgmq: PGMQueue,
}

impl PgmqClient {
    /// Create new pgmq client using connection string
    pub async fn new(database_url: &str) -> Result<Self, MessagingError> {
        info!("🚀 Connecting to pgmq");

        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| MessagingError::Backend(e.to_string()))?;

        info!("✅ Connected to pgmq");
        Ok(Self { pgmq })
    }
}

#[async_trait]
impl MessageQueue for PgmqClient {
    async fn create_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        debug!("📋 Creating queue: {}", queue_name);

        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| MessagingError::Backend(format!("Failed to create queue {queue_name}: {e}")))?;

        info!("✅ Queue created: {}", queue_name);
        Ok(())
    }

    async fn send_json(
        &self,
        queue_name: &str,
        message: &serde_json::Value,
    ) -> Result<i64, MessagingError> {
        debug!("📤 Sending message to queue: {}", queue_name);

        let message_id = self
            .pgmq
            .send(queue_name, message)
            .await
            .map_err(|e| MessagingError::Backend(format!("Failed to send to {queue_name}: {e}")))?;

        debug!(
            "✅ Message sent to queue: {} with id: {}",
            queue_name, message_id
        );
        Ok(message_id)
    }

    async fn read(
        &self,
        queue_name: &str,
        visibility_timeout: Option<i32>,
    ) -> Result<Option<QueueMessage>, MessagingError> {
        let message = self
            .pgmq
            .read::<serde_json::Value>(queue_name, visibility_timeout)
            .await
            .map_err(|e| MessagingError::Backend(format!("Failed to read from {queue_name}: {e}")))?;

        Ok(message.map(|m| QueueMessage {
            msg_id: m.msg_id,
            read_count: m.read_ct,
            message: m.message,
        }))
    }

    async fn delete(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError> {
        debug!("🗑️ Deleting message {} from queue: {}", msg_id, queue_name);

        self.pgmq
            .delete(queue_name, msg_id)
            .await
            .map_err(|e| MessagingError::Backend(format!("Failed to delete message {msg_id}: {e}")))?;

        Ok(())
    }

    async fn archive(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError> {
        debug!("📦 Archiving message {} from queue: {}", msg_id, queue_name);

        self.pgmq
            .archive(queue_name, msg_id)
            .await
            .map_err(|e| MessagingError::Backend(format!("Failed to archive message {msg_id}: {e}")))?;

        Ok(())
    }
}
