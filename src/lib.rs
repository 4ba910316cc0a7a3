//! # Exception Collector Core
//!
//! Failure-tolerant retry and resilience core for blood-product interface
//! exception handling.
//!
//! ## Overview
//!
//! Event-driven services in the platform exchange interface events over
//! message queues. When a consumer exhausts its local retries for a
//! message, the failure is captured here as a durable
//! `InterfaceException` and can later be replayed against the source
//! service — safely, at most one in-flight retry per exception, bounded
//! by a per-record ceiling, behind admission control and a resilient
//! connection layer.
//!
//! ## Module Organization
//!
//! - [`models`] - `InterfaceException`/`RetryAttempt` records and enums
//! - [`store`] - durable store with the atomic retry-admission point
//! - [`state_machine`] - exception status lifecycle
//! - [`intake`] - decode/validate/process guard with retry + dead-letter
//! - [`messaging`] - queue transport and DLQ publishing
//! - [`orchestration`] - retry orchestration, management, capture
//! - [`client`] - source-service clients and the connection manager
//! - [`resilience`] - circuit breaker and call policies
//! - [`concurrency`] - operation admission control
//! - [`cache`] - validation cache with event-driven invalidation
//! - [`web`] - REST API
//!
//! ## Resilience model
//!
//! Two independent layers guard remote calls: the connection manager
//! reconnects the transport (backoff, fallback mode), while a circuit
//! breaker + timeout + retry policy wraps each call. A transport drop and
//! an application error are deliberately not conflated.

pub mod cache;
pub mod client;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod events;
pub mod intake;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod state_machine;
pub mod store;
pub mod test_helpers;
pub mod web;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
