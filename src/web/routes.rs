use super::handlers::{connection, exceptions, health, retries};
use super::state::AppState;
use axum::routing::{delete, get, post, put};
use axum::Router;

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/exceptions/search", get(exceptions::search))
        .route("/api/v1/exceptions/summary", get(exceptions::summary))
        .route(
            "/api/v1/exceptions/{transaction_id}",
            get(exceptions::get_exception),
        )
        .route(
            "/api/v1/exceptions/{transaction_id}/related",
            get(exceptions::related),
        )
        .route(
            "/api/v1/exceptions/{transaction_id}/acknowledge",
            put(exceptions::acknowledge),
        )
        .route(
            "/api/v1/exceptions/{transaction_id}/resolve",
            put(exceptions::resolve),
        )
        .route(
            "/api/v1/exceptions/{transaction_id}/retry",
            post(retries::initiate_retry),
        )
        .route(
            "/api/v1/exceptions/{transaction_id}/retry-history",
            get(retries::retry_history),
        )
        .route(
            "/api/v1/exceptions/{transaction_id}/retry/latest",
            get(retries::latest_retry),
        )
        .route(
            "/api/v1/exceptions/{transaction_id}/retry/statistics",
            get(retries::retry_statistics),
        )
        .route(
            "/api/v1/exceptions/{transaction_id}/retry/{attempt_number}",
            delete(retries::cancel_retry),
        )
        .route("/api/v1/connection/status", get(connection::status))
        .route("/api/v1/connection/reconnect", post(connection::reconnect))
        .with_state(state)
}
