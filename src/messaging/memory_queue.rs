//! In-memory `MessageQueue` for tests and local development.
//!
//! Read messages move to an in-flight map and are only gone once deleted
//! or archived, mirroring pgmq's at-least-once behavior. Visibility
//! timeouts are not simulated; tests drive redelivery explicitly with
//! `requeue_in_flight`.

use super::errors::MessagingError;
use super::message::QueueMessage;
use super::queue::MessageQueue;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_id: i64,
    queues: HashMap<String, VecDeque<QueueMessage>>,
    in_flight: HashMap<(String, i64), QueueMessage>,
}

#[derive(Default)]
pub struct InMemoryQueue {
    inner: Mutex<Inner>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of visible messages in a queue.
    pub async fn len(&self, queue_name: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.queues.get(queue_name).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, queue_name: &str) -> bool {
        self.len(queue_name).await == 0
    }

    /// Snapshot of visible messages, front first.
    pub async fn peek_all(&self, queue_name: &str) -> Vec<QueueMessage> {
        let inner = self.inner.lock().await;
        inner
            .queues
            .get(queue_name)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Make all in-flight messages of a queue visible again, as if their
    /// visibility timeout expired.
    pub async fn requeue_in_flight(&self, queue_name: &str) {
        let mut inner = self.inner.lock().await;
        let keys: Vec<(String, i64)> = inner
            .in_flight
            .keys()
            .filter(|(q, _)| q == queue_name)
            .cloned()
            .collect();
        for key in keys {
            if let Some(mut msg) = inner.in_flight.remove(&key) {
                msg.read_count += 1;
                inner.queues.entry(key.0).or_default().push_back(msg);
            }
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn create_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        let mut inner = self.inner.lock().await;
        inner.queues.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn send_json(
        &self,
        queue_name: &str,
        message: &serde_json::Value,
    ) -> Result<i64, MessagingError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let msg_id = inner.next_id;
        inner
            .queues
            .entry(queue_name.to_string())
            .or_default()
            .push_back(QueueMessage {
                msg_id,
                read_count: 0,
                message: message.clone(),
            });
        Ok(msg_id)
    }

    async fn read(
        &self,
        queue_name: &str,
        _visibility_timeout: Option<i32>,
    ) -> Result<Option<QueueMessage>, MessagingError> {
        let mut inner = self.inner.lock().await;
        let Some(queue) = inner.queues.get_mut(queue_name) else {
            return Ok(None);
        };
        let Some(mut msg) = queue.pop_front() else {
            return Ok(None);
        };
        msg.read_count += 1;
        inner
            .in_flight
            .insert((queue_name.to_string(), msg.msg_id), msg.clone());
        Ok(Some(msg))
    }

    async fn delete(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&(queue_name.to_string(), msg_id));
        Ok(())
    }

    async fn archive(&self, queue_name: &str, msg_id: i64) -> Result<(), MessagingError> {
        // No separate archive table in memory; archiving just acks.
        self.delete(queue_name, msg_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_read_delete_cycle() {
        let queue = InMemoryQueue::new();
        queue.create_queue("orders").await.unwrap();

        let id = queue.send_json("orders", &json!({"k": 1})).await.unwrap();
        assert_eq!(queue.len("orders").await, 1);

        let msg = queue.read("orders", Some(30)).await.unwrap().unwrap();
        assert_eq!(msg.msg_id, id);
        assert_eq!(msg.read_count, 1);
        assert_eq!(queue.len("orders").await, 0);

        queue.delete("orders", id).await.unwrap();
        queue.requeue_in_flight("orders").await;
        assert_eq!(queue.len("orders").await, 0);
    }

    #[tokio::test]
    async fn test_unacked_message_is_redelivered() {
        let queue = InMemoryQueue::new();
        queue.create_queue("orders").await.unwrap();
        queue.send_json("orders", &json!({"k": 1})).await.unwrap();

        let first = queue.read("orders", None).await.unwrap().unwrap();
        queue.requeue_in_flight("orders").await;

        let second = queue.read("orders", None).await.unwrap().unwrap();
        assert_eq!(first.msg_id, second.msg_id);
        assert_eq!(second.read_count, 2);
    }
}
