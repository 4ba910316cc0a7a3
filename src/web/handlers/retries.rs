//! Retry lifecycle handlers.

use crate::cache::OperationType;
use crate::models::{RetryAttempt, RetryStatistics};
use crate::orchestration::{RetryPriority, RetryRequest, RetryResponse};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::{caller_identity, AppState};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct InitiateRetryBody {
    pub reason: String,
    #[serde(default)]
    pub priority: RetryPriority,
    pub initiated_by: Option<String>,
}

/// `POST /api/v1/exceptions/{transactionId}/retry`
///
/// 202 with the attempt id on success; the remote call completes in the
/// background. 404 for unknown transactions, 409 when not retryable or a
/// retry is already pending, 429 at capacity.
pub async fn initiate_retry(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<InitiateRetryBody>,
) -> ApiResult<(StatusCode, Json<RetryResponse>)> {
    let caller = caller_identity(&headers);
    // Permit released on drop; any early return below hands the slots back.
    let _permit = state
        .admission
        .acquire_operation_permit("retry", &caller)
        .await?;

    let validation = state
        .validation
        .validate_for_operation(&transaction_id, OperationType::Retry)
        .await?;
    if !validation.valid {
        return Err(ApiError::from_validation(&validation));
    }

    let request = RetryRequest {
        reason: body.reason,
        priority: body.priority,
        initiated_by: body.initiated_by.unwrap_or_else(|| caller.clone()),
    };

    let response = state
        .orchestrator
        .initiate_retry(&transaction_id, request)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `GET /api/v1/exceptions/{transactionId}/retry-history`
pub async fn retry_history(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> ApiResult<Json<Vec<RetryAttempt>>> {
    let history = state.orchestrator.get_retry_history(&transaction_id).await?;
    Ok(Json(history))
}

/// `GET /api/v1/exceptions/{transactionId}/retry/latest` — 404 when the
/// exception has no attempts yet.
pub async fn latest_retry(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> ApiResult<Json<RetryAttempt>> {
    let latest = state
        .orchestrator
        .get_latest_retry_attempt(&transaction_id)
        .await?;
    match latest {
        Some(attempt) => Ok(Json(attempt)),
        None => Err(ApiError::not_found(
            "NO_RETRY_ATTEMPTS",
            format!("No retry attempts found for transaction: {transaction_id}"),
        )),
    }
}

/// `GET /api/v1/exceptions/{transactionId}/retry/statistics`
pub async fn retry_statistics(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> ApiResult<Json<RetryStatistics>> {
    let stats = state
        .orchestrator
        .get_retry_statistics(&transaction_id)
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Serialize)]
pub struct CancelRetryResponse {
    pub transaction_id: String,
    pub attempt_number: i32,
    pub cancelled: bool,
}

/// `DELETE /api/v1/exceptions/{transactionId}/retry/{attemptNumber}` —
/// 409 when the attempt is not cancellable.
pub async fn cancel_retry(
    State(state): State<AppState>,
    Path((transaction_id, attempt_number)): Path<(String, i32)>,
    headers: HeaderMap,
) -> ApiResult<Json<CancelRetryResponse>> {
    let caller = caller_identity(&headers);
    let _permit = state
        .admission
        .acquire_operation_permit("cancel_retry", &caller)
        .await?;

    let cancelled = state
        .orchestrator
        .cancel_retry(&transaction_id, attempt_number)
        .await?;

    if !cancelled {
        return Err(ApiError::conflict(
            "NO_PENDING_RETRY_TO_CANCEL",
            format!(
                "Attempt {attempt_number} for transaction {transaction_id} is not cancellable"
            ),
        ));
    }

    Ok(Json(CancelRetryResponse {
        transaction_id,
        attempt_number,
        cancelled: true,
    }))
}
