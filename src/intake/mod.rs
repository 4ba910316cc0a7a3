//! # Message Intake Guard
//!
//! Turns "decode + validate + process one inbound event" into an operation
//! with bounded, observable failure. Decode failures dead-letter
//! immediately; validation and domain failures retry on a fixed delay and
//! dead-letter on exhaustion so a poison message can never block its
//! queue.

pub mod guard;
pub mod listener;

pub use guard::{ExceptionRecorder, InboundProcessor, IntakeGuard, IntakeOutcome, ProcessingError};
pub use listener::QueueListener;
