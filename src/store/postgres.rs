//! Postgres-backed `ExceptionStore`.
//!
//! Uses the runtime query API with explicit row structs; enum columns are
//! stored as text and parsed on the way out. `begin_attempt` takes a row
//! lock on the exception so admission checks and attempt creation are one
//! atomic unit.

use super::{ExceptionStore, RetryDenialReason, StoreError, StoreResult};
use crate::models::{
    ExceptionSummary, InterfaceException, NewInterfaceException, ResolutionMethod, RetryAttempt,
    RetryOutcome, RetryStatistics, RetryStatus,
};
use crate::state_machine::states::ExceptionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

const EXCEPTION_COLUMNS: &str = "id, transaction_id, external_id, interface_type, operation, \
     exception_reason, status, severity, category, retryable, retry_count, max_retries, \
     customer_id, location_code, timestamp, processed_at, acknowledged_at, acknowledged_by, \
     acknowledgment_notes, last_retry_at, resolved_at, resolved_by, resolution_method, \
     resolution_notes, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, exception_id, attempt_number, status, initiated_by, \
     initiated_at, completed_at, result_success, result_message, result_response_code, \
     result_error_details";

#[derive(Debug, FromRow)]
struct ExceptionRow {
    id: i64,
    transaction_id: String,
    external_id: Option<String>,
    interface_type: String,
    operation: String,
    exception_reason: String,
    status: String,
    severity: String,
    category: String,
    retryable: bool,
    retry_count: i32,
    max_retries: i32,
    customer_id: Option<String>,
    location_code: Option<String>,
    timestamp: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    acknowledged_at: Option<DateTime<Utc>>,
    acknowledged_by: Option<String>,
    acknowledgment_notes: Option<String>,
    last_retry_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    resolution_method: Option<String>,
    resolution_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ExceptionRow> for InterfaceException {
    type Error = StoreError;

    fn try_from(row: ExceptionRow) -> Result<Self, Self::Error> {
        Ok(InterfaceException {
            id: row.id,
            transaction_id: row.transaction_id,
            external_id: row.external_id,
            interface_type: row
                .interface_type
                .parse()
                .map_err(StoreError::Corrupt)?,
            operation: row.operation,
            exception_reason: row.exception_reason,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            severity: row.severity.parse().map_err(StoreError::Corrupt)?,
            category: row.category.parse().map_err(StoreError::Corrupt)?,
            retryable: row.retryable,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            customer_id: row.customer_id,
            location_code: row.location_code,
            timestamp: row.timestamp,
            processed_at: row.processed_at,
            acknowledged_at: row.acknowledged_at,
            acknowledged_by: row.acknowledged_by,
            acknowledgment_notes: row.acknowledgment_notes,
            last_retry_at: row.last_retry_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            resolution_method: row
                .resolution_method
                .map(|m| m.parse().map_err(StoreError::Corrupt))
                .transpose()?,
            resolution_notes: row.resolution_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AttemptRow {
    id: i64,
    exception_id: i64,
    attempt_number: i32,
    status: String,
    initiated_by: String,
    initiated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    result_success: Option<bool>,
    result_message: Option<String>,
    result_response_code: Option<i32>,
    result_error_details: Option<String>,
}

impl TryFrom<AttemptRow> for RetryAttempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(RetryAttempt {
            id: row.id,
            exception_id: row.exception_id,
            attempt_number: row.attempt_number,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            initiated_by: row.initiated_by,
            initiated_at: row.initiated_at,
            completed_at: row.completed_at,
            result_success: row.result_success,
            result_message: row.result_message,
            result_response_code: row.result_response_code,
            result_error_details: row.result_error_details,
        })
    }
}

/// Postgres implementation over a shared connection pool.
#[derive(Clone)]
pub struct PgExceptionStore {
    pool: PgPool,
}

impl PgExceptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_exception(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<InterfaceException>> {
        let sql = format!(
            "SELECT {EXCEPTION_COLUMNS} FROM interface_exceptions WHERE transaction_id = $1"
        );
        let row = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(InterfaceException::try_from).transpose()
    }
}

#[async_trait]
impl ExceptionStore for PgExceptionStore {
    async fn insert(&self, new: NewInterfaceException) -> StoreResult<InterfaceException> {
        let sql = format!(
            "INSERT INTO interface_exceptions (
                transaction_id, external_id, interface_type, operation, exception_reason,
                status, severity, category, retryable, retry_count, max_retries,
                customer_id, location_code, timestamp, processed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 'NEW', $6, $7, $8, 0, $9, $10, $11, $12, NOW(), NOW(), NOW())
            RETURNING {EXCEPTION_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(&new.transaction_id)
            .bind(&new.external_id)
            .bind(new.interface_type.to_string())
            .bind(&new.operation)
            .bind(&new.exception_reason)
            .bind(new.severity.to_string())
            .bind(new.category.to_string())
            .bind(new.retryable)
            .bind(new.max_retries)
            .bind(&new.customer_id)
            .bind(&new.location_code)
            .bind(new.timestamp)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::DuplicateTransaction(new.transaction_id.clone())
                }
                _ => StoreError::Database(e),
            })?;

        row.try_into()
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<InterfaceException>> {
        self.fetch_exception(transaction_id).await
    }

    async fn find_related_by_customer(
        &self,
        customer_id: &str,
        exclude_transaction_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<InterfaceException>> {
        let sql = format!(
            "SELECT {EXCEPTION_COLUMNS} FROM interface_exceptions
             WHERE customer_id = $1 AND transaction_id <> $2
             ORDER BY timestamp DESC
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(customer_id)
            .bind(exclude_transaction_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(InterfaceException::try_from).collect()
    }

    async fn search(&self, query: &str, limit: i64) -> StoreResult<Vec<InterfaceException>> {
        let pattern = format!("%{query}%");
        let sql = format!(
            "SELECT {EXCEPTION_COLUMNS} FROM interface_exceptions
             WHERE exception_reason ILIKE $1
                OR operation ILIKE $1
                OR external_id ILIKE $1
             ORDER BY timestamp DESC
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(InterfaceException::try_from).collect()
    }

    async fn summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<ExceptionSummary> {
        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM interface_exceptions WHERE timestamp BETWEEN $1 AND $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        let group = |column: &str| {
            format!(
                "SELECT {column}, COUNT(*) FROM interface_exceptions
                 WHERE timestamp BETWEEN $1 AND $2 GROUP BY {column} ORDER BY {column}"
            )
        };

        let by_interface_type: Vec<(String, i64)> = sqlx::query_as(&group("interface_type"))
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        let by_severity: Vec<(String, i64)> = sqlx::query_as(&group("severity"))
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        let by_status: Vec<(String, i64)> = sqlx::query_as(&group("status"))
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        let to_u64 = |pairs: Vec<(String, i64)>| {
            pairs
                .into_iter()
                .map(|(k, v)| (k, v.max(0) as u64))
                .collect()
        };

        Ok(ExceptionSummary {
            total: total.0.max(0) as u64,
            by_interface_type: to_u64(by_interface_type),
            by_severity: to_u64(by_severity),
            by_status: to_u64(by_status),
        })
    }

    async fn update_status(
        &self,
        transaction_id: &str,
        to: ExceptionStatus,
    ) -> StoreResult<InterfaceException> {
        let sql = format!(
            "UPDATE interface_exceptions SET status = $2, updated_at = NOW()
             WHERE transaction_id = $1
             RETURNING {EXCEPTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(transaction_id)
            .bind(to.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;
        row.try_into()
    }

    async fn acknowledge(
        &self,
        transaction_id: &str,
        acknowledged_by: &str,
        notes: Option<String>,
    ) -> StoreResult<InterfaceException> {
        let sql = format!(
            "UPDATE interface_exceptions
             SET status = 'ACKNOWLEDGED', acknowledged_at = NOW(), acknowledged_by = $2,
                 acknowledgment_notes = $3, updated_at = NOW()
             WHERE transaction_id = $1
             RETURNING {EXCEPTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(transaction_id)
            .bind(acknowledged_by)
            .bind(notes)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;
        row.try_into()
    }

    async fn resolve(
        &self,
        transaction_id: &str,
        resolved_by: &str,
        method: ResolutionMethod,
        notes: Option<String>,
    ) -> StoreResult<InterfaceException> {
        let sql = format!(
            "UPDATE interface_exceptions
             SET status = 'RESOLVED', resolved_at = NOW(), resolved_by = $2,
                 resolution_method = $3, resolution_notes = $4, updated_at = NOW()
             WHERE transaction_id = $1
             RETURNING {EXCEPTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(transaction_id)
            .bind(resolved_by)
            .bind(method.to_string())
            .bind(notes)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;
        row.try_into()
    }

    async fn record_retry_result(
        &self,
        transaction_id: &str,
        success: bool,
    ) -> StoreResult<InterfaceException> {
        let sql = if success {
            format!(
                "UPDATE interface_exceptions
                 SET status = 'RETRIED_SUCCESS', resolved_at = NOW(),
                     resolution_method = 'RETRY_SUCCESS', updated_at = NOW()
                 WHERE transaction_id = $1
                 RETURNING {EXCEPTION_COLUMNS}"
            )
        } else {
            format!(
                "UPDATE interface_exceptions
                 SET status = 'RETRIED_FAILED', updated_at = NOW()
                 WHERE transaction_id = $1
                 RETURNING {EXCEPTION_COLUMNS}"
            )
        };
        let row = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;
        row.try_into()
    }

    async fn begin_attempt(
        &self,
        transaction_id: &str,
        initiated_by: &str,
    ) -> StoreResult<RetryAttempt> {
        let mut tx = self.pool.begin().await?;

        // Row lock closes the race between concurrent initiations.
        let sql = format!(
            "SELECT {EXCEPTION_COLUMNS} FROM interface_exceptions
             WHERE transaction_id = $1 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, ExceptionRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;
        let exception: InterfaceException = row.try_into()?;

        if !exception.retryable {
            return Err(StoreError::RetryDenied {
                transaction_id: transaction_id.to_string(),
                reason: RetryDenialReason::NotRetryable,
            });
        }
        if !exception.status.allows_retry() {
            return Err(StoreError::RetryDenied {
                transaction_id: transaction_id.to_string(),
                reason: RetryDenialReason::InvalidStatus(exception.status),
            });
        }
        if exception.retry_count >= exception.max_retries {
            return Err(StoreError::RetryDenied {
                transaction_id: transaction_id.to_string(),
                reason: RetryDenialReason::RetryLimitExceeded {
                    count: exception.retry_count,
                    max: exception.max_retries,
                },
            });
        }

        let pending: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM retry_attempts WHERE exception_id = $1 AND status = 'PENDING'",
        )
        .bind(exception.id)
        .fetch_one(&mut *tx)
        .await?;
        if pending.0 > 0 {
            return Err(StoreError::RetryDenied {
                transaction_id: transaction_id.to_string(),
                reason: RetryDenialReason::PendingAttemptExists,
            });
        }

        let next_number: (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(attempt_number), 0) + 1 FROM retry_attempts WHERE exception_id = $1",
        )
        .bind(exception.id)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!(
            "INSERT INTO retry_attempts (
                exception_id, attempt_number, status, initiated_by, initiated_at
            )
            VALUES ($1, $2, 'PENDING', $3, NOW())
            RETURNING {ATTEMPT_COLUMNS}"
        );
        let attempt_row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(exception.id)
            .bind(next_number.0)
            .bind(initiated_by)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE interface_exceptions
             SET retry_count = retry_count + 1, last_retry_at = NOW(), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(exception.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        attempt_row.try_into()
    }

    async fn complete_attempt(
        &self,
        transaction_id: &str,
        attempt_number: i32,
        outcome: RetryOutcome,
    ) -> StoreResult<RetryAttempt> {
        let exception =
            self.fetch_exception(transaction_id)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    transaction_id: transaction_id.to_string(),
                })?;

        let status = if outcome.success {
            RetryStatus::Success
        } else {
            RetryStatus::Failed
        };

        let sql = format!(
            "UPDATE retry_attempts
             SET status = $3, completed_at = NOW(), result_success = $4, result_message = $5,
                 result_response_code = $6, result_error_details = $7
             WHERE exception_id = $1 AND attempt_number = $2
             RETURNING {ATTEMPT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(exception.id)
            .bind(attempt_number)
            .bind(status.to_string())
            .bind(outcome.success)
            .bind(&outcome.message)
            .bind(outcome.response_code)
            .bind(&outcome.error_details)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::AttemptNotFound {
                transaction_id: transaction_id.to_string(),
                attempt_number,
            })?;
        row.try_into()
    }

    async fn find_attempt(
        &self,
        transaction_id: &str,
        attempt_number: i32,
    ) -> StoreResult<Option<RetryAttempt>> {
        let Some(exception) = self.fetch_exception(transaction_id).await? else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM retry_attempts
             WHERE exception_id = $1 AND attempt_number = $2"
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(exception.id)
            .bind(attempt_number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RetryAttempt::try_from).transpose()
    }

    async fn list_attempts(&self, transaction_id: &str) -> StoreResult<Vec<RetryAttempt>> {
        let exception =
            self.fetch_exception(transaction_id)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    transaction_id: transaction_id.to_string(),
                })?;
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM retry_attempts
             WHERE exception_id = $1 ORDER BY attempt_number ASC"
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(exception.id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RetryAttempt::try_from).collect()
    }

    async fn latest_attempt(&self, transaction_id: &str) -> StoreResult<Option<RetryAttempt>> {
        let exception =
            self.fetch_exception(transaction_id)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    transaction_id: transaction_id.to_string(),
                })?;
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM retry_attempts
             WHERE exception_id = $1 ORDER BY attempt_number DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(exception.id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RetryAttempt::try_from).transpose()
    }

    async fn attempt_statistics(&self, transaction_id: &str) -> StoreResult<RetryStatistics> {
        let exception =
            self.fetch_exception(transaction_id)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    transaction_id: transaction_id.to_string(),
                })?;
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM retry_attempts WHERE exception_id = $1 GROUP BY status",
        )
        .bind(exception.id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = RetryStatistics::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            stats.total_attempts += count;
            match status.as_str() {
                "SUCCESS" => stats.successful_attempts = count,
                "FAILED" => stats.failed_attempts = count,
                "PENDING" => stats.pending_attempts = count,
                other => {
                    return Err(StoreError::Corrupt(format!(
                        "unexpected attempt status in database: {other}"
                    )))
                }
            }
        }
        Ok(stats)
    }
}
