//! End-to-end retry workflow over the in-memory store and the managed
//! streaming connection.

use exception_collector::cache::{CacheInvalidationListener, OperationType, ValidationCacheService};
use exception_collector::client::{
    ConnectionManager, SourceClientRegistry, StreamingOrderServiceClient,
};
use exception_collector::config::{CacheConfig, CircuitBreakerSettings, ConnectionConfig, RetryConfig};
use exception_collector::events::EventPublisher;
use exception_collector::models::{InterfaceType, RetryStatus};
use exception_collector::orchestration::{RetryOrchestrator, RetryPriority, RetryRequest};
use exception_collector::resilience::{CircuitBreaker, ResilientPolicy};
use exception_collector::state_machine::ExceptionStatus;
use exception_collector::store::{ExceptionStore, InMemoryExceptionStore};
use exception_collector::test_helpers::factories::new_exception;
use exception_collector::test_helpers::mock_source_client::MockSourceClient;
use exception_collector::test_helpers::mock_transport::MockStreamingTransport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        host: "localhost".to_string(),
        port: 7000,
        request_timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_millis(200),
        keep_alive_interval: Duration::from_secs(20),
        keep_alive_max_lifetime: Duration::from_secs(90),
        connect_max_attempts: 2,
        connect_backoff_base: Duration::from_millis(5),
        connect_backoff_max: Duration::from_millis(20),
        reconnect_delay: Duration::from_millis(10),
        max_reconnect_attempts: 2,
    }
}

fn retry_config() -> RetryConfig {
    RetryConfig {
        default_max_retries: 5,
        estimated_completion: Duration::from_secs(300),
    }
}

fn policy() -> ResilientPolicy {
    ResilientPolicy::new(
        Arc::new(CircuitBreaker::new(
            "order-service".to_string(),
            CircuitBreakerSettings {
                failure_threshold: 10,
                open_timeout: Duration::from_secs(30),
                success_threshold: 1,
                call_timeout: Duration::from_millis(200),
                call_retry_attempts: 1,
            },
        )),
        Duration::from_millis(200),
        1,
    )
}

fn request() -> RetryRequest {
    RetryRequest {
        reason: "operator replay".to_string(),
        priority: RetryPriority::High,
        initiated_by: "ops".to_string(),
    }
}

async fn wait_for_attempt_completion(
    store: &InMemoryExceptionStore,
    txn: &str,
    attempt_number: i32,
) {
    for _ in 0..200 {
        if let Some(attempt) = store.find_attempt(txn, attempt_number).await.unwrap() {
            if attempt.status != RetryStatus::Pending {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("attempt {attempt_number} for {txn} never completed");
}

/// Full path: captured exception → retry over the streaming connection →
/// RETRIED_SUCCESS with a resolved timestamp.
#[tokio::test]
async fn test_retry_through_streaming_connection_succeeds() {
    let store = Arc::new(InMemoryExceptionStore::new());
    let created = store.insert(new_exception("TXN-1")).await.unwrap();
    assert_eq!(created.status, ExceptionStatus::New);

    let transport = Arc::new(
        MockStreamingTransport::healthy()
            .with_route_response("orders.EXT-TXN-1", json!({"orderId": "EXT-TXN-1"}))
            .with_route_response("orders.submit", json!({"statusCode": 200})),
    );
    let connection = ConnectionManager::new(connection_config(), transport);
    connection.establish_connection().await.unwrap();

    let registry = Arc::new(SourceClientRegistry::new());
    registry.register(Arc::new(StreamingOrderServiceClient::new(
        connection,
        policy(),
    )));

    let orchestrator = RetryOrchestrator::new(
        store.clone(),
        registry,
        EventPublisher::new(64),
        retry_config(),
    );

    let response = orchestrator.initiate_retry("TXN-1", request()).await.unwrap();
    assert_eq!(response.status, "PENDING");
    wait_for_attempt_completion(&store, "TXN-1", response.attempt_number).await;

    let exception = store.find_by_transaction_id("TXN-1").await.unwrap().unwrap();
    assert_eq!(exception.status, ExceptionStatus::RetriedSuccess);
    assert!(exception.resolved_at.is_some());
    assert_eq!(exception.retry_count, 1);
}

/// Fallback mode degrades payload retrieval, which fails the attempt but
/// leaves the exception retryable.
#[tokio::test]
async fn test_retry_in_fallback_mode_fails_cleanly() {
    let store = Arc::new(InMemoryExceptionStore::new());
    store.insert(new_exception("TXN-1")).await.unwrap();

    let transport = Arc::new(MockStreamingTransport::refusing());
    let connection = ConnectionManager::new(connection_config(), transport);
    let _ = connection.establish_connection().await;
    assert!(connection.is_fallback_mode());

    let registry = Arc::new(SourceClientRegistry::new());
    registry.register(Arc::new(StreamingOrderServiceClient::new(
        connection,
        policy(),
    )));
    let orchestrator = RetryOrchestrator::new(
        store.clone(),
        registry,
        EventPublisher::new(64),
        retry_config(),
    );

    let response = orchestrator.initiate_retry("TXN-1", request()).await.unwrap();
    wait_for_attempt_completion(&store, "TXN-1", response.attempt_number).await;

    let attempt = store.find_attempt("TXN-1", 1).await.unwrap().unwrap();
    assert_eq!(attempt.status, RetryStatus::Failed);
    assert!(attempt.result_message.unwrap().contains("payload"));

    let exception = store.find_by_transaction_id("TXN-1").await.unwrap().unwrap();
    assert_eq!(exception.status, ExceptionStatus::RetriedFailed);
    assert!(orchestrator.can_retry("TXN-1").await.unwrap());
}

/// The validation cache serves eligibility checks and recomputes after
/// lifecycle events invalidate its entries.
#[tokio::test]
async fn test_validation_cache_tracks_retry_lifecycle() {
    let store = Arc::new(InMemoryExceptionStore::new());
    store.insert(new_exception("TXN-1")).await.unwrap();

    let publisher = EventPublisher::new(64);
    let cache = Arc::new(ValidationCacheService::new(
        store.clone(),
        &CacheConfig {
            max_entries: 100,
            time_to_live: Duration::from_secs(300),
        },
    ));
    let _listener = CacheInvalidationListener::new(cache.clone()).spawn(&publisher);

    let registry = Arc::new(SourceClientRegistry::new());
    registry.register(Arc::new(MockSourceClient::succeeding(InterfaceType::Order)));
    let orchestrator =
        RetryOrchestrator::new(store.clone(), registry, publisher.clone(), retry_config());

    // Eligible before any retry.
    assert!(cache
        .validate_for_operation("TXN-1", OperationType::Retry)
        .await
        .unwrap()
        .valid);

    let response = orchestrator.initiate_retry("TXN-1", request()).await.unwrap();
    wait_for_attempt_completion(&store, "TXN-1", response.attempt_number).await;

    // The success transition invalidates the cached verdict; the
    // recomputed one must reject further retries (terminal status).
    let mut rejected = false;
    for _ in 0..100 {
        let result = cache
            .validate_for_operation("TXN-1", OperationType::Retry)
            .await
            .unwrap();
        if !result.valid {
            rejected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(rejected, "stale eligible verdict survived the status change");
}

/// Retry ceiling: once retry_count reaches max_retries, admission stops.
#[tokio::test]
async fn test_retry_ceiling_is_enforced() {
    let store = Arc::new(InMemoryExceptionStore::new());
    let mut exception = new_exception("TXN-1");
    exception.max_retries = 2;
    store.insert(exception).await.unwrap();

    let registry = Arc::new(SourceClientRegistry::new());
    registry.register(Arc::new(MockSourceClient::failing_submit(
        InterfaceType::Order,
        500,
    )));
    let orchestrator = RetryOrchestrator::new(
        store.clone(),
        registry,
        EventPublisher::new(64),
        retry_config(),
    );

    for n in 1..=2 {
        let response = orchestrator.initiate_retry("TXN-1", request()).await.unwrap();
        assert_eq!(response.attempt_number, n);
        wait_for_attempt_completion(&store, "TXN-1", n).await;
    }

    assert!(!orchestrator.can_retry("TXN-1").await.unwrap());
    let denied = orchestrator.initiate_retry("TXN-1", request()).await;
    assert!(denied.is_err());

    let exception = store.find_by_transaction_id("TXN-1").await.unwrap().unwrap();
    assert_eq!(exception.retry_count, 2);
}
