//! Collector server: wires configuration, the Postgres store, queue
//! listeners, the connection manager and the REST API together.

use exception_collector::cache::{CacheInvalidationListener, ValidationCacheService};
use exception_collector::client::{
    ConnectionManager, SourceClientRegistry, StreamingOrderServiceClient, TcpStreamingTransport,
};
use exception_collector::concurrency::AdmissionController;
use exception_collector::config::CollectorConfig;
use exception_collector::events::EventPublisher;
use exception_collector::logging;
use exception_collector::intake::{IntakeGuard, QueueListener};
use exception_collector::messaging::{DeadLetterPublisher, MessageQueue, PgmqClient};
use exception_collector::orchestration::{
    ExceptionCaptureService, ExceptionManagementService, RetryOrchestrator,
};
use exception_collector::resilience::{CircuitBreakerManager, ResilientPolicy};
use exception_collector::state_machine::ExceptionStateMachine;
use exception_collector::store::{ExceptionStore, PgExceptionStore};
use exception_collector::web::{router, AppState};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    let config = CollectorConfig::from_env()?;
    info!(bind = %config.web_bind_address, "Starting exception collector");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let store: Arc<dyn ExceptionStore> = Arc::new(PgExceptionStore::new(pool));
    let event_publisher = EventPublisher::default();

    // Validation cache + invalidation listener.
    let validation = Arc::new(ValidationCacheService::new(store.clone(), &config.cache));
    CacheInvalidationListener::new(validation.clone()).spawn(&event_publisher);

    // Connection manager over the configured streaming transport.
    let transport = Arc::new(TcpStreamingTransport::new());
    let connection = ConnectionManager::new(config.connection.clone(), transport);
    if let Err(e) = connection.establish_connection().await {
        info!(error = %e, "Initial connection failed, continuing in fallback mode");
    }

    // Call-level resilience around the streaming client.
    let breakers = CircuitBreakerManager::new(config.circuit_breaker.clone());
    let policy = ResilientPolicy::new(
        breakers.get_circuit_breaker("order-service"),
        config.circuit_breaker.call_timeout,
        config.circuit_breaker.call_retry_attempts,
    );

    let registry = Arc::new(SourceClientRegistry::new());
    registry.register(Arc::new(StreamingOrderServiceClient::new(
        connection.clone(),
        policy,
    )));

    let orchestrator = RetryOrchestrator::new(
        store.clone(),
        registry,
        event_publisher.clone(),
        config.retry.clone(),
    );
    let management = Arc::new(ExceptionManagementService::new(ExceptionStateMachine::new(
        store.clone(),
        event_publisher.clone(),
    )));
    let admission = Arc::new(AdmissionController::new(config.concurrency.clone()));

    // Queue intake: one listener per interface event queue, all guarded
    // by bounded retry + dead-letter fallback. Processing an inbound
    // event in this service means capturing it durably.
    let capture = Arc::new(ExceptionCaptureService::new(
        store.clone(),
        event_publisher.clone(),
        config.retry.clone(),
    ));
    let queue_client: Arc<dyn MessageQueue> = Arc::new(PgmqClient::new(&config.database_url).await?);
    let intake_guard = Arc::new(IntakeGuard::new(
        config.intake.clone(),
        capture.clone(),
        DeadLetterPublisher::new(queue_client.clone()),
        None,
    ));
    for queue_name in [
        "order-events",
        "collection-events",
        "distribution-events",
        "partner-order-events",
    ] {
        queue_client.create_queue(queue_name).await?;
        queue_client
            .create_queue(&DeadLetterPublisher::dlq_name(queue_name))
            .await?;
        let listener = QueueListener::new(
            queue_name,
            queue_client.clone(),
            intake_guard.clone(),
            config.intake.clone(),
        );
        tokio::spawn(async move { listener.run().await });
    }

    let state = AppState {
        store,
        orchestrator,
        management,
        admission,
        validation,
        connection,
    };

    let listener = tokio::net::TcpListener::bind(&config.web_bind_address).await?;
    info!(addr = %config.web_bind_address, "🚀 Exception collector listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
