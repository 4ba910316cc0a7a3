//! # Retry Orchestrator
//!
//! Validates retry eligibility against the exception state machine,
//! creates attempts, drives the remote replay through the source-service
//! client and records the outcome. The pending-attempt invariant is
//! enforced by the store's atomic `begin_attempt`; two callers racing
//! through `can_retry` still produce exactly one attempt.

use crate::client::SourceClientRegistry;
use crate::config::RetryConfig;
use crate::events::{CollectorEvent, EventPublisher};
use crate::models::{InterfaceException, RetryAttempt, RetryOutcome, RetryStatistics, RetryStatus};
use crate::store::{ExceptionStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Caller-supplied priority for a retry. Recorded for observability and
/// queue ordering in the source systems; the orchestrator itself treats
/// all priorities alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Caller request to initiate a retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRequest {
    pub reason: String,
    #[serde(default)]
    pub priority: RetryPriority,
    pub initiated_by: String,
}

/// Acknowledgment returned to the caller before the remote call completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryResponse {
    pub retry_id: i64,
    pub attempt_number: i32,
    pub status: String,
    pub message: String,
    pub estimated_completion: DateTime<Utc>,
}

/// Errors surfaced synchronously from retry operations.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("Exception not found for transaction: {0}")]
    ExceptionNotFound(String),

    #[error("Retry not allowed for transaction {transaction_id}: {message}")]
    RetryNotAllowed {
        transaction_id: String,
        code: &'static str,
        message: String,
    },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RetryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { transaction_id } => Self::ExceptionNotFound(transaction_id),
            StoreError::RetryDenied {
                transaction_id,
                reason,
            } => Self::RetryNotAllowed {
                transaction_id,
                code: reason.code(),
                message: reason.to_string(),
            },
            other => Self::Store(other),
        }
    }
}

/// Cheap to clone; clones share the store, client registry and event bus.
#[derive(Clone)]
pub struct RetryOrchestrator {
    store: Arc<dyn ExceptionStore>,
    clients: Arc<SourceClientRegistry>,
    event_publisher: EventPublisher,
    config: RetryConfig,
}

impl RetryOrchestrator {
    pub fn new(
        store: Arc<dyn ExceptionStore>,
        clients: Arc<SourceClientRegistry>,
        event_publisher: EventPublisher,
        config: RetryConfig,
    ) -> Self {
        Self {
            store,
            clients,
            event_publisher,
            config,
        }
    }

    /// Whether a retry would currently be admitted for this transaction.
    /// Missing transactions answer `false` rather than erroring.
    pub async fn can_retry(&self, transaction_id: &str) -> StoreResult<bool> {
        let Some(exception) = self.store.find_by_transaction_id(transaction_id).await? else {
            return Ok(false);
        };

        if !exception.retry_admissible() {
            return Ok(false);
        }

        let latest = self.store.latest_attempt(transaction_id).await?;
        Ok(!matches!(latest, Some(a) if a.status == RetryStatus::Pending))
    }

    /// Admit and launch a retry.
    ///
    /// The attempt is created atomically; the remote call is dispatched on
    /// a background task and the caller gets an acknowledgment with an
    /// estimated completion time.
    pub async fn initiate_retry(
        &self,
        transaction_id: &str,
        request: RetryRequest,
    ) -> Result<RetryResponse, RetryError> {
        info!(
            transaction_id = %transaction_id,
            initiated_by = %request.initiated_by,
            reason = %request.reason,
            priority = ?request.priority,
            "Initiating retry"
        );

        let attempt = self
            .store
            .begin_attempt(transaction_id, &request.initiated_by)
            .await?;

        let exception = self
            .store
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| RetryError::ExceptionNotFound(transaction_id.to_string()))?;

        if let Err(e) = self.event_publisher.publish(CollectorEvent::RetryAttemptStarted {
            transaction_id: transaction_id.to_string(),
            attempt_number: attempt.attempt_number,
            initiated_by: request.initiated_by.clone(),
        }) {
            warn!(transaction_id = %transaction_id, error = %e, "Failed to publish retry started event");
        }

        // Fire-and-forget: the mutation acknowledges before the remote
        // call completes.
        let orchestrator = self.clone();
        let attempt_for_task = attempt.clone();
        tokio::spawn(async move {
            orchestrator.execute_retry(exception, attempt_for_task).await;
        });

        info!(
            transaction_id = %transaction_id,
            attempt_number = attempt.attempt_number,
            "Retry initiated"
        );

        Ok(RetryResponse {
            retry_id: attempt.id,
            attempt_number: attempt.attempt_number,
            status: RetryStatus::Pending.to_string(),
            message: "Retry operation initiated successfully".to_string(),
            estimated_completion: Utc::now()
                + chrono::Duration::from_std(self.config.estimated_completion)
                    .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        })
    }

    /// Background execution: fetch the original payload, resubmit it and
    /// record the outcome. Every failure path lands in
    /// `handle_retry_failure`; nothing escapes the task.
    async fn execute_retry(&self, exception: InterfaceException, attempt: RetryAttempt) {
        let transaction_id = exception.transaction_id.clone();
        info!(
            transaction_id = %transaction_id,
            attempt_number = attempt.attempt_number,
            "Executing retry"
        );

        let Some(client) = self.clients.get(exception.interface_type) else {
            self.handle_retry_failure(
                &transaction_id,
                attempt.attempt_number,
                format!(
                    "No source service client registered for interface type: {}",
                    exception.interface_type
                ),
                None,
                None,
            )
            .await;
            return;
        };

        // Step 1: recover the original payload.
        let payload_response = client.get_original_payload(&exception).await;
        if !payload_response.retrieved {
            let reason = payload_response
                .error_message
                .unwrap_or_else(|| "unknown".to_string());
            self.handle_retry_failure(
                &transaction_id,
                attempt.attempt_number,
                format!("Failed to retrieve original payload: {reason}"),
                None,
                Some(reason),
            )
            .await;
            return;
        }
        let payload = payload_response.payload.unwrap_or(serde_json::Value::Null);

        // Step 2: resubmit to the source service.
        match client.submit_retry(&exception, &payload).await {
            Ok(result) if result.is_success() => {
                self.handle_retry_success(
                    &transaction_id,
                    attempt.attempt_number,
                    "Retry completed successfully".to_string(),
                    Some(i32::from(result.status_code)),
                )
                .await;
            }
            Ok(result) => {
                let body = result
                    .body
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "No response body".to_string());
                self.handle_retry_failure(
                    &transaction_id,
                    attempt.attempt_number,
                    format!("Retry failed with status: {}", result.status_code),
                    Some(i32::from(result.status_code)),
                    Some(body),
                )
                .await;
            }
            Err(e) => {
                self.handle_retry_failure(
                    &transaction_id,
                    attempt.attempt_number,
                    format!("Retry execution failed: {e}"),
                    None,
                    Some(e.to_string()),
                )
                .await;
            }
        }
    }

    /// Record a successful retry: attempt → SUCCESS, exception →
    /// RETRIED_SUCCESS with `resolved_at` set.
    pub async fn handle_retry_success(
        &self,
        transaction_id: &str,
        attempt_number: i32,
        message: String,
        response_code: Option<i32>,
    ) {
        info!(
            transaction_id = %transaction_id,
            attempt_number,
            "Retry succeeded"
        );

        let outcome = RetryOutcome::success(message, response_code);
        if let Err(e) = self
            .store
            .complete_attempt(transaction_id, attempt_number, outcome)
            .await
        {
            error!(transaction_id = %transaction_id, error = %e, "Failed to record attempt success");
            return;
        }

        self.apply_result_status(transaction_id, true).await;
        self.publish_attempt_completed(transaction_id, attempt_number, true);
    }

    /// Record a failed retry: attempt → FAILED, exception →
    /// RETRIED_FAILED (still retryable up to its ceiling).
    pub async fn handle_retry_failure(
        &self,
        transaction_id: &str,
        attempt_number: i32,
        message: String,
        response_code: Option<i32>,
        error_details: Option<String>,
    ) {
        warn!(
            transaction_id = %transaction_id,
            attempt_number,
            message = %message,
            "Retry failed"
        );

        let outcome = RetryOutcome::failure(message, response_code, error_details);
        if let Err(e) = self
            .store
            .complete_attempt(transaction_id, attempt_number, outcome)
            .await
        {
            error!(transaction_id = %transaction_id, error = %e, "Failed to record attempt failure");
            return;
        }

        self.apply_result_status(transaction_id, false).await;
        self.publish_attempt_completed(transaction_id, attempt_number, false);
    }

    async fn apply_result_status(&self, transaction_id: &str, success: bool) {
        let from = match self.store.find_by_transaction_id(transaction_id).await {
            Ok(Some(e)) => e.status,
            _ => {
                error!(transaction_id = %transaction_id, "Exception vanished while recording retry result");
                return;
            }
        };

        match self.store.record_retry_result(transaction_id, success).await {
            Ok(updated) => {
                if let Err(e) =
                    self.event_publisher
                        .publish(CollectorEvent::ExceptionStatusChanged {
                            transaction_id: transaction_id.to_string(),
                            from,
                            to: updated.status,
                        })
                {
                    warn!(transaction_id = %transaction_id, error = %e, "Failed to publish status change");
                }
            }
            Err(e) => {
                error!(transaction_id = %transaction_id, error = %e, "Failed to record retry result")
            }
        }
    }

    fn publish_attempt_completed(&self, transaction_id: &str, attempt_number: i32, success: bool) {
        if let Err(e) = self
            .event_publisher
            .publish(CollectorEvent::RetryAttemptCompleted {
                transaction_id: transaction_id.to_string(),
                attempt_number,
                success,
            })
        {
            warn!(transaction_id = %transaction_id, error = %e, "Failed to publish retry completed event");
        }
    }

    /// Cancel a PENDING attempt. Cooperative: the attempt is flipped to
    /// FAILED but an already-submitted remote call is not aborted.
    /// Returns `false` (not an error) when the attempt is missing or not
    /// cancellable.
    pub async fn cancel_retry(
        &self,
        transaction_id: &str,
        attempt_number: i32,
    ) -> StoreResult<bool> {
        let Some(attempt) = self.store.find_attempt(transaction_id, attempt_number).await? else {
            return Ok(false);
        };

        if attempt.status != RetryStatus::Pending {
            return Ok(false);
        }

        self.store
            .complete_attempt(
                transaction_id,
                attempt_number,
                RetryOutcome::failure(
                    "Retry cancelled by user",
                    None,
                    Some("User cancelled retry operation".to_string()),
                ),
            )
            .await?;

        info!(
            transaction_id = %transaction_id,
            attempt_number,
            "Retry cancelled"
        );
        self.publish_attempt_completed(transaction_id, attempt_number, false);

        Ok(true)
    }

    /// All attempts for an exception, ordered by attempt number.
    pub async fn get_retry_history(&self, transaction_id: &str) -> StoreResult<Vec<RetryAttempt>> {
        self.store.list_attempts(transaction_id).await
    }

    pub async fn get_latest_retry_attempt(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<RetryAttempt>> {
        // Missing transactions must surface as not-found, not as "no attempts".
        if self
            .store
            .find_by_transaction_id(transaction_id)
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            });
        }
        self.store.latest_attempt(transaction_id).await
    }

    pub async fn get_retry_statistics(
        &self,
        transaction_id: &str,
    ) -> StoreResult<RetryStatistics> {
        self.store.attempt_statistics(transaction_id).await
    }
}
