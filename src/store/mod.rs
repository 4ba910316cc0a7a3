//! # Exception Record Store
//!
//! Durable CRUD + query surface for `InterfaceException` and
//! `RetryAttempt`. The store is the single enforcement point for the
//! pending-attempt invariant: `begin_attempt` re-validates retry
//! eligibility and creates the new attempt in one atomic step (row lock in
//! Postgres, a single mutex section in the in-memory implementation), so
//! two concurrent initiations for the same transaction can never both
//! create a PENDING attempt.

pub mod memory;
pub mod postgres;

use crate::models::{
    ExceptionSummary, InterfaceException, NewInterfaceException, ResolutionMethod, RetryAttempt,
    RetryOutcome, RetryStatistics,
};
use crate::state_machine::states::ExceptionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

pub use memory::InMemoryExceptionStore;
pub use postgres::PgExceptionStore;

/// Why a retry admission was denied by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDenialReason {
    NotRetryable,
    InvalidStatus(ExceptionStatus),
    RetryLimitExceeded { count: i32, max: i32 },
    PendingAttemptExists,
}

impl RetryDenialReason {
    /// Machine-readable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotRetryable => "NOT_RETRYABLE",
            Self::InvalidStatus(_) => "INVALID_STATUS_TRANSITION",
            Self::RetryLimitExceeded { .. } => "RETRY_LIMIT_EXCEEDED",
            Self::PendingAttemptExists => "PENDING_RETRY_EXISTS",
        }
    }
}

impl fmt::Display for RetryDenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRetryable => write!(f, "exception is not retryable"),
            Self::InvalidStatus(status) => {
                write!(f, "status {status} does not allow retry")
            }
            Self::RetryLimitExceeded { count, max } => {
                write!(f, "retry limit exceeded ({count}/{max})")
            }
            Self::PendingAttemptExists => write!(f, "a retry is already pending"),
        }
    }
}

/// Errors surfaced by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Exception not found for transaction: {transaction_id}")]
    NotFound { transaction_id: String },

    #[error("Attempt {attempt_number} not found for transaction: {transaction_id}")]
    AttemptNotFound {
        transaction_id: String,
        attempt_number: i32,
    },

    #[error("Duplicate transaction id: {0}")]
    DuplicateTransaction(String),

    #[error("Retry not allowed for transaction {transaction_id}: {reason}")]
    RetryDenied {
        transaction_id: String,
        reason: RetryDenialReason,
    },

    #[error("Status {from} does not allow {operation} for transaction {transaction_id}")]
    OperationNotAllowed {
        transaction_id: String,
        operation: &'static str,
        from: ExceptionStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for exception records and their retry attempts.
#[async_trait]
pub trait ExceptionStore: Send + Sync {
    /// Insert a newly captured exception in status `NEW`.
    async fn insert(&self, new: NewInterfaceException) -> StoreResult<InterfaceException>;

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<InterfaceException>>;

    /// Other exceptions captured for the same customer, newest first.
    async fn find_related_by_customer(
        &self,
        customer_id: &str,
        exclude_transaction_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<InterfaceException>>;

    /// Substring search over reason, external id and operation.
    async fn search(&self, query: &str, limit: i64) -> StoreResult<Vec<InterfaceException>>;

    /// Aggregate counts grouped by interface type, severity and status.
    async fn summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<ExceptionSummary>;

    /// Persist a status change without touching audit fields. Callers are
    /// expected to have validated the edge through the state machine.
    async fn update_status(
        &self,
        transaction_id: &str,
        to: ExceptionStatus,
    ) -> StoreResult<InterfaceException>;

    /// Acknowledge: status + audit fields in one write.
    async fn acknowledge(
        &self,
        transaction_id: &str,
        acknowledged_by: &str,
        notes: Option<String>,
    ) -> StoreResult<InterfaceException>;

    /// Resolve: status + resolution audit fields in one write.
    async fn resolve(
        &self,
        transaction_id: &str,
        resolved_by: &str,
        method: ResolutionMethod,
        notes: Option<String>,
    ) -> StoreResult<InterfaceException>;

    /// Apply a completed retry outcome to the exception record: success
    /// moves it to `RETRIED_SUCCESS` with `resolved_at` set, failure to
    /// `RETRIED_FAILED` leaving `resolved_at` untouched.
    async fn record_retry_result(
        &self,
        transaction_id: &str,
        success: bool,
    ) -> StoreResult<InterfaceException>;

    /// Atomically admit and create the next retry attempt.
    ///
    /// Re-checks retryable flag, status, retry ceiling and the
    /// pending-attempt invariant under the same lock that creates the
    /// attempt and bumps `retry_count`/`last_retry_at`.
    async fn begin_attempt(
        &self,
        transaction_id: &str,
        initiated_by: &str,
    ) -> StoreResult<RetryAttempt>;

    /// Complete a PENDING attempt with the given outcome.
    async fn complete_attempt(
        &self,
        transaction_id: &str,
        attempt_number: i32,
        outcome: RetryOutcome,
    ) -> StoreResult<RetryAttempt>;

    async fn find_attempt(
        &self,
        transaction_id: &str,
        attempt_number: i32,
    ) -> StoreResult<Option<RetryAttempt>>;

    /// All attempts, ordered by attempt number ascending.
    async fn list_attempts(&self, transaction_id: &str) -> StoreResult<Vec<RetryAttempt>>;

    async fn latest_attempt(&self, transaction_id: &str) -> StoreResult<Option<RetryAttempt>>;

    async fn attempt_statistics(&self, transaction_id: &str) -> StoreResult<RetryStatistics>;
}
