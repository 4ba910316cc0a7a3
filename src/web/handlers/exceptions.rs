//! Exception query and management handlers.

use crate::cache::OperationType;
use crate::models::{ExceptionSummary, InterfaceException};
use crate::orchestration::management::{AcknowledgeRequest, ResolveRequest};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::{caller_identity, AppState};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// `GET /api/v1/exceptions/{transactionId}`
pub async fn get_exception(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> ApiResult<Json<InterfaceException>> {
    let exception = state
        .store
        .find_by_transaction_id(&transaction_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(
                "EXCEPTION_NOT_FOUND",
                format!("Exception not found for transaction: {transaction_id}"),
            )
        })?;
    Ok(Json(exception))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /api/v1/exceptions/search?q=...` — substring search over reason,
/// external id and operation.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<InterfaceException>>> {
    if params.q.trim().is_empty() {
        return Err(ApiError::BadRequest {
            message: "query parameter 'q' must not be empty".to_string(),
        });
    }
    let hits = state.store.search(&params.q, params.limit).await?;
    Ok(Json(hits))
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// `GET /api/v1/exceptions/summary` — aggregate counts over a time range
/// (default: the last 24 hours).
pub async fn summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> ApiResult<Json<ExceptionSummary>> {
    let to = params.to.unwrap_or_else(Utc::now);
    let from = params.from.unwrap_or_else(|| to - Duration::hours(24));
    let summary = state.store.summary(from, to).await?;
    Ok(Json(summary))
}

/// `GET /api/v1/exceptions/{transactionId}/related` — other exceptions
/// for the same customer.
pub async fn related(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> ApiResult<Json<Vec<InterfaceException>>> {
    let exception = state
        .store
        .find_by_transaction_id(&transaction_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(
                "EXCEPTION_NOT_FOUND",
                format!("Exception not found for transaction: {transaction_id}"),
            )
        })?;

    let Some(customer_id) = exception.customer_id.as_deref() else {
        return Ok(Json(Vec::new()));
    };
    let related = state
        .store
        .find_related_by_customer(customer_id, &transaction_id, 50)
        .await?;
    Ok(Json(related))
}

/// `PUT /api/v1/exceptions/{transactionId}/acknowledge` — 409 when the
/// status forbids acknowledgment.
pub async fn acknowledge(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AcknowledgeRequest>,
) -> ApiResult<Json<InterfaceException>> {
    let caller = caller_identity(&headers);
    let _permit = state
        .admission
        .acquire_operation_permit("acknowledge", &caller)
        .await?;

    let validation = state
        .validation
        .validate_for_operation(&transaction_id, OperationType::Acknowledge)
        .await?;
    if !validation.valid {
        return Err(ApiError::from_validation(&validation));
    }

    let updated = state
        .management
        .acknowledge_exception(&transaction_id, body)
        .await?;
    Ok(Json(updated))
}

/// `PUT /api/v1/exceptions/{transactionId}/resolve` — 409 when the status
/// forbids resolution.
pub async fn resolve(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ResolveRequest>,
) -> ApiResult<Json<InterfaceException>> {
    let caller = caller_identity(&headers);
    let _permit = state
        .admission
        .acquire_operation_permit("resolve", &caller)
        .await?;

    let validation = state
        .validation
        .validate_for_operation(&transaction_id, OperationType::Resolve)
        .await?;
    if !validation.valid {
        return Err(ApiError::from_validation(&validation));
    }

    let updated = state
        .management
        .resolve_exception(&transaction_id, body)
        .await?;
    Ok(Json(updated))
}
