use crate::models::InterfaceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as read from a queue, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub msg_id: i64,
    /// How many times this message has been read (at-least-once delivery).
    pub read_count: i32,
    /// The payload exactly as enqueued.
    pub message: serde_json::Value,
}

/// Typed inbound interface event, decoded from a queue message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub transaction_id: String,
    pub external_id: Option<String>,
    pub interface_type: InterfaceType,
    pub operation: String,
    /// Domain payload, opaque to the intake guard.
    pub payload: serde_json::Value,
    pub customer_id: Option<String>,
    pub location_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Message published to a dead-letter queue after intake gives up.
///
/// The original payload is carried through untouched; no schema is imposed
/// on it beyond "same value as the input".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    pub original: serde_json::Value,
    pub error_message: String,
    pub source_queue: String,
    pub failed_at: DateTime<Utc>,
}
