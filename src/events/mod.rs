//! Event system foundation: an in-process bus carrying exception lifecycle
//! events to subscribers such as the cache invalidation listener.

pub mod publisher;

pub use publisher::{CollectorEvent, EventPublisher, PublishError, PublishedEvent};
