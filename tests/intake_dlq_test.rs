//! Intake guard + listener + capture working against the in-memory
//! queue: poison messages land on the DLQ exactly once and are recorded
//! as durable exceptions.

use async_trait::async_trait;
use chrono::Utc;
use exception_collector::config::{IntakeConfig, RetryConfig};
use exception_collector::events::EventPublisher;
use exception_collector::intake::{
    InboundProcessor, IntakeGuard, IntakeOutcome, ProcessingError, QueueListener,
};
use exception_collector::messaging::{
    DeadLetterMessage, DeadLetterPublisher, InMemoryQueue, InboundEvent, MessageQueue,
};
use exception_collector::models::InterfaceType;
use exception_collector::orchestration::ExceptionCaptureService;
use exception_collector::state_machine::ExceptionStatus;
use exception_collector::store::{ExceptionStore, InMemoryExceptionStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const QUEUE: &str = "order-events";

struct AlwaysFailing;

#[async_trait]
impl InboundProcessor for AlwaysFailing {
    async fn process(&self, _event: &InboundEvent) -> Result<(), ProcessingError> {
        Err(ProcessingError("domain processing failed".to_string()))
    }
}

fn intake_config() -> IntakeConfig {
    IntakeConfig {
        max_attempts: 3,
        retry_delay: Duration::from_millis(2),
        visibility_timeout_secs: 30,
    }
}

fn event_value(txn: &str) -> serde_json::Value {
    serde_json::to_value(InboundEvent {
        transaction_id: txn.to_string(),
        external_id: Some(format!("EXT-{txn}")),
        interface_type: InterfaceType::Order,
        operation: "CREATE_ORDER".to_string(),
        payload: json!({"orderId": 42, "reason": "inventory unavailable"}),
        customer_id: Some("CUST-1".to_string()),
        location_code: None,
        occurred_at: Utc::now(),
    })
    .unwrap()
}

/// A message failing 3 attempts appears exactly once on the DLQ with the
/// original payload intact, and the failure is captured durably.
#[tokio::test]
async fn test_exhausted_message_dead_letters_and_captures() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.create_queue(QUEUE).await.unwrap();

    let store = Arc::new(InMemoryExceptionStore::new());
    let capture = Arc::new(ExceptionCaptureService::new(
        store.clone(),
        EventPublisher::new(16),
        RetryConfig {
            default_max_retries: 5,
            estimated_completion: Duration::from_secs(300),
        },
    ));

    let guard = Arc::new(IntakeGuard::new(
        intake_config(),
        Arc::new(AlwaysFailing),
        DeadLetterPublisher::new(queue.clone()),
        Some(capture),
    ));
    let listener = QueueListener::new(QUEUE, queue.clone(), guard, intake_config());

    let original = event_value("TXN-1");
    queue.send_json(QUEUE, &original).await.unwrap();

    let outcome = listener.poll_once().await.unwrap().unwrap();
    assert!(matches!(outcome, IntakeOutcome::DeadLettered { .. }));

    // Exactly one DLQ message, payload identical to the input.
    let dead = queue.peek_all("order-events-dlq").await;
    assert_eq!(dead.len(), 1);
    let parsed: DeadLetterMessage = serde_json::from_value(dead[0].message.clone()).unwrap();
    assert_eq!(parsed.original, original);
    assert_eq!(parsed.error_message, "domain processing failed");
    assert_eq!(parsed.source_queue, QUEUE);

    // Captured as a NEW, retryable exception.
    let exception = store.find_by_transaction_id("TXN-1").await.unwrap().unwrap();
    assert_eq!(exception.status, ExceptionStatus::New);
    assert!(exception.retryable);
    assert_eq!(exception.interface_type, InterfaceType::Order);

    // The message itself was acknowledged: nothing left to redeliver.
    queue.requeue_in_flight(QUEUE).await;
    assert!(queue.is_empty(QUEUE).await);
}

/// Capture-as-processing: inbound exception events become records on the
/// happy path without touching the DLQ.
#[tokio::test]
async fn test_capture_processor_happy_path() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.create_queue(QUEUE).await.unwrap();

    let store = Arc::new(InMemoryExceptionStore::new());
    let capture = Arc::new(ExceptionCaptureService::new(
        store.clone(),
        EventPublisher::new(16),
        RetryConfig {
            default_max_retries: 5,
            estimated_completion: Duration::from_secs(300),
        },
    ));

    let guard = Arc::new(IntakeGuard::new(
        intake_config(),
        capture,
        DeadLetterPublisher::new(queue.clone()),
        None,
    ));
    let listener = QueueListener::new(QUEUE, queue.clone(), guard, intake_config());

    queue.send_json(QUEUE, &event_value("TXN-9")).await.unwrap();
    let outcome = listener.poll_once().await.unwrap().unwrap();
    assert_eq!(outcome, IntakeOutcome::Processed);

    let exception = store.find_by_transaction_id("TXN-9").await.unwrap().unwrap();
    assert_eq!(exception.exception_reason, "inventory unavailable");
    assert!(queue.is_empty("order-events-dlq").await);

    // Redelivery of the same event is idempotent.
    queue.send_json(QUEUE, &event_value("TXN-9")).await.unwrap();
    assert_eq!(
        listener.poll_once().await.unwrap().unwrap(),
        IntakeOutcome::Processed
    );
}

/// Undecodable messages bypass retry entirely.
#[tokio::test]
async fn test_decode_failure_goes_straight_to_dlq() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.create_queue(QUEUE).await.unwrap();

    let store = Arc::new(InMemoryExceptionStore::new());
    let capture = Arc::new(ExceptionCaptureService::new(
        store.clone(),
        EventPublisher::new(16),
        RetryConfig {
            default_max_retries: 5,
            estimated_completion: Duration::from_secs(300),
        },
    ));
    let guard = Arc::new(IntakeGuard::new(
        intake_config(),
        Arc::new(AlwaysFailing),
        DeadLetterPublisher::new(queue.clone()),
        Some(capture),
    ));
    let listener = QueueListener::new(QUEUE, queue.clone(), guard, intake_config());

    let garbage = json!({"unexpected": true});
    queue.send_json(QUEUE, &garbage).await.unwrap();

    let outcome = listener.poll_once().await.unwrap().unwrap();
    assert!(matches!(outcome, IntakeOutcome::DeadLettered { .. }));

    let dead = queue.peek_all("order-events-dlq").await;
    assert_eq!(dead.len(), 1);
    let parsed: DeadLetterMessage = serde_json::from_value(dead[0].message.clone()).unwrap();
    assert_eq!(parsed.original, garbage);

    // No transaction id could be decoded, so nothing was captured.
    assert!(store.find_by_transaction_id("TXN-1").await.unwrap().is_none());
}
