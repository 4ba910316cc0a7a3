use crate::cache::{ValidationCacheError, ValidationResult};
use crate::concurrency::AdmissionError;
use crate::orchestration::{ManagementError, RetryError};
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

/// API error with a machine-readable code, rendered as JSON.
#[derive(Debug)]
pub enum ApiError {
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Capacity { message: String },
    BadRequest { message: String },
    Internal { message: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl ApiError {
    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Map a failed eligibility check to the proper status: unknown
    /// transactions are 404, everything else is a conflict.
    pub fn from_validation(result: &ValidationResult) -> Self {
        let code = result.error_code().unwrap_or("VALIDATION_FAILED").to_string();
        let message = result
            .errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "validation failed".to_string());

        if code == "EXCEPTION_NOT_FOUND" {
            Self::NotFound { code, message }
        } else {
            Self::Conflict { code, message }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            Self::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            Self::Capacity { message } => (
                StatusCode::TOO_MANY_REQUESTS,
                "CONCURRENCY_LIMIT_EXCEEDED".to_string(),
                message,
            ),
            Self::BadRequest { message } => (
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST".to_string(),
                message,
            ),
            Self::Internal { message } => {
                error!(message = %message, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR".to_string(),
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { code, message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { transaction_id } => Self::not_found(
                "EXCEPTION_NOT_FOUND",
                format!("Exception not found for transaction: {transaction_id}"),
            ),
            StoreError::AttemptNotFound {
                transaction_id,
                attempt_number,
            } => Self::not_found(
                "RETRY_ATTEMPT_NOT_FOUND",
                format!("Attempt {attempt_number} not found for transaction: {transaction_id}"),
            ),
            StoreError::RetryDenied { reason, .. } => {
                Self::conflict(reason.code(), reason.to_string())
            }
            StoreError::DuplicateTransaction(txn) => Self::conflict(
                "DUPLICATE_TRANSACTION",
                format!("Transaction already exists: {txn}"),
            ),
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<RetryError> for ApiError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::ExceptionNotFound(txn) => Self::not_found(
                "EXCEPTION_NOT_FOUND",
                format!("Exception not found for transaction: {txn}"),
            ),
            RetryError::RetryNotAllowed { code, message, .. } => Self::conflict(code, message),
            RetryError::Store(store) => store.into(),
        }
    }
}

impl From<ManagementError> for ApiError {
    fn from(e: ManagementError) -> Self {
        match e {
            ManagementError::NotFound(txn) => Self::not_found(
                "EXCEPTION_NOT_FOUND",
                format!("Exception not found for transaction: {txn}"),
            ),
            ManagementError::NotAllowed(message) => {
                Self::conflict("INVALID_STATUS_TRANSITION", message)
            }
            ManagementError::Store(store) => store.into(),
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        Self::Capacity {
            message: e.to_string(),
        }
    }
}

impl From<ValidationCacheError> for ApiError {
    fn from(e: ValidationCacheError) -> Self {
        Self::Internal {
            message: e.to_string(),
        }
    }
}
