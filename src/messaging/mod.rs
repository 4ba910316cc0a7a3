//! # Messaging Module
//!
//! Queue transport for inbound interface events and dead-letter routing.
//! The transport is Postgres message queues (pgmq); everything above it
//! talks to the `MessageQueue` trait so tests can run against the
//! in-memory implementation.

pub mod dead_letter;
pub mod errors;
pub mod memory_queue;
pub mod message;
pub mod pgmq_client;
pub mod queue;

pub use dead_letter::DeadLetterPublisher;
pub use errors::MessagingError;
pub use memory_queue::InMemoryQueue;
pub use message::{DeadLetterMessage, InboundEvent, QueueMessage};
pub use pgmq_client::PgmqClient;
pub use queue::MessageQueue;
