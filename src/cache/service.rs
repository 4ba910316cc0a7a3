use super::validation::{OperationType, ValidationError, ValidationResult};
use crate::config::CacheConfig;
use crate::models::RetryStatus;
use crate::store::{ExceptionStore, StoreError};
use moka::future::Cache;
use std::sync::Arc;
use tracing::{debug, info};

/// Store failures observed while computing a validation result. Such
/// results are never cached.
#[derive(Debug, thiserror::Error)]
#[error("Validation query failed: {0}")]
pub struct ValidationCacheError(#[source] pub Arc<StoreError>);

type CacheResult = Result<ValidationResult, ValidationCacheError>;

/// Caches eligibility checks per transaction id, plus a composite result
/// per `(transaction id, operation type)`.
pub struct ValidationCacheService {
    store: Arc<dyn ExceptionStore>,
    existence: Cache<String, ValidationResult>,
    retryable: Cache<String, ValidationResult>,
    retry_count: Cache<String, ValidationResult>,
    pending_retry: Cache<String, ValidationResult>,
    status: Cache<String, ValidationResult>,
    operation: Cache<(String, OperationType), ValidationResult>,
}

impl ValidationCacheService {
    pub fn new(store: Arc<dyn ExceptionStore>, config: &CacheConfig) -> Self {
        let build = || {
            Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(config.time_to_live)
                .build()
        };

        Self {
            store,
            existence: build(),
            retryable: build(),
            retry_count: build(),
            pending_retry: build(),
            status: build(),
            operation: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(config.time_to_live)
                .build(),
        }
    }

    /// Exception existence check.
    pub async fn validate_exception_exists(&self, transaction_id: &str) -> CacheResult {
        let store = self.store.clone();
        let txn = transaction_id.to_string();
        self.existence
            .try_get_with(txn.clone(), async move {
                debug!(transaction_id = %txn, "Validating existence (cache miss)");
                let found = store.find_by_transaction_id(&txn).await?;
                Ok::<_, StoreError>(match found {
                    Some(_) => ValidationResult::success("existence", txn.as_str()),
                    None => ValidationResult::failure(
                        "existence",
                        txn.as_str(),
                        vec![ValidationError::not_found(&txn)],
                    ),
                })
            })
            .await
            .map_err(ValidationCacheError)
    }

    /// Retryable-flag check.
    pub async fn validate_exception_retryable(&self, transaction_id: &str) -> CacheResult {
        let store = self.store.clone();
        let txn = transaction_id.to_string();
        self.retryable
            .try_get_with(txn.clone(), async move {
                debug!(transaction_id = %txn, "Validating retryable flag (cache miss)");
                let Some(exception) = store.find_by_transaction_id(&txn).await? else {
                    return Ok(ValidationResult::failure(
                        "retryable",
                        txn.as_str(),
                        vec![ValidationError::not_found(&txn)],
                    ));
                };
                Ok::<_, StoreError>(if exception.retryable {
                    ValidationResult::success("retryable", txn.as_str())
                } else {
                    ValidationResult::failure(
                        "retryable",
                        txn.as_str(),
                        vec![ValidationError::new(
                            "NOT_RETRYABLE",
                            format!("Exception is not retryable for transaction: {txn}"),
                        )],
                    )
                })
            })
            .await
            .map_err(ValidationCacheError)
    }

    /// Retry-count ceiling check.
    pub async fn validate_retry_count(&self, transaction_id: &str) -> CacheResult {
        let store = self.store.clone();
        let txn = transaction_id.to_string();
        self.retry_count
            .try_get_with(txn.clone(), async move {
                debug!(transaction_id = %txn, "Validating retry count (cache miss)");
                let Some(exception) = store.find_by_transaction_id(&txn).await? else {
                    return Ok(ValidationResult::failure(
                        "retry_count",
                        txn.as_str(),
                        vec![ValidationError::not_found(&txn)],
                    ));
                };
                Ok::<_, StoreError>(if exception.retry_count >= exception.max_retries {
                    ValidationResult::failure(
                        "retry_count",
                        txn.as_str(),
                        vec![ValidationError::new(
                            "RETRY_LIMIT_EXCEEDED",
                            format!(
                                "Retry limit exceeded for transaction: {txn} ({}/{})",
                                exception.retry_count, exception.max_retries
                            ),
                        )],
                    )
                } else {
                    ValidationResult::success("retry_count", txn.as_str())
                })
            })
            .await
            .map_err(ValidationCacheError)
    }

    /// Pending-attempt check.
    pub async fn validate_no_pending_retry(&self, transaction_id: &str) -> CacheResult {
        let store = self.store.clone();
        let txn = transaction_id.to_string();
        self.pending_retry
            .try_get_with(txn.clone(), async move {
                debug!(transaction_id = %txn, "Validating no pending retry (cache miss)");
                if store.find_by_transaction_id(&txn).await?.is_none() {
                    return Ok(ValidationResult::failure(
                        "pending_retry",
                        txn.as_str(),
                        vec![ValidationError::not_found(&txn)],
                    ));
                }
                let latest = store.latest_attempt(&txn).await?;
                Ok::<_, StoreError>(match latest {
                    Some(attempt) if attempt.status == RetryStatus::Pending => {
                        ValidationResult::failure(
                            "pending_retry",
                            txn.as_str(),
                            vec![ValidationError::new(
                                "PENDING_RETRY_EXISTS",
                                format!("A retry is already pending for transaction: {txn}"),
                            )],
                        )
                    }
                    _ => ValidationResult::success("pending_retry", txn.as_str()),
                })
            })
            .await
            .map_err(ValidationCacheError)
    }

    /// Status-allows-operation check.
    pub async fn validate_exception_status(&self, transaction_id: &str) -> CacheResult {
        let store = self.store.clone();
        let txn = transaction_id.to_string();
        self.status
            .try_get_with(txn.clone(), async move {
                debug!(transaction_id = %txn, "Validating status (cache miss)");
                let Some(exception) = store.find_by_transaction_id(&txn).await? else {
                    return Ok(ValidationResult::failure(
                        "status",
                        txn.as_str(),
                        vec![ValidationError::not_found(&txn)],
                    ));
                };
                Ok::<_, StoreError>(if exception.status.allows_management() {
                    ValidationResult::success("status", txn.as_str())
                } else {
                    ValidationResult::failure(
                        "status",
                        txn.as_str(),
                        vec![ValidationError::new(
                            "INVALID_STATUS_TRANSITION",
                            format!(
                                "Exception cannot be processed due to status: {} for transaction: {txn}",
                                exception.status
                            ),
                        )],
                    )
                })
            })
            .await
            .map_err(ValidationCacheError)
    }

    /// Composite per-operation validation, built from the per-check
    /// caches the same way callers would compose them.
    pub async fn validate_for_operation(
        &self,
        transaction_id: &str,
        operation: OperationType,
    ) -> CacheResult {
        let key = (transaction_id.to_string(), operation);
        if let Some(cached) = self.operation.get(&key).await {
            return Ok(cached);
        }

        debug!(
            transaction_id = %transaction_id,
            operation = %operation,
            "Validating operation (cache miss)"
        );

        let result = match operation {
            OperationType::Retry => self.compute_retry_validation(transaction_id).await?,
            OperationType::Acknowledge => {
                self.compute_acknowledge_validation(transaction_id).await?
            }
            OperationType::Resolve => {
                // Existence is the only gate; terminal-state rejection is
                // left to the state machine at execution time.
                let existence = self.validate_exception_exists(transaction_id).await?;
                if existence.valid {
                    ValidationResult::success(operation.to_string(), transaction_id)
                } else {
                    existence
                }
            }
            OperationType::Cancel => self.compute_cancel_validation(transaction_id).await?,
        };

        self.operation.insert(key, result.clone()).await;
        Ok(result)
    }

    async fn compute_retry_validation(&self, transaction_id: &str) -> CacheResult {
        for result in [
            self.validate_exception_exists(transaction_id).await?,
            self.validate_exception_retryable(transaction_id).await?,
            self.validate_retry_count(transaction_id).await?,
            self.validate_no_pending_retry(transaction_id).await?,
            self.validate_exception_status(transaction_id).await?,
        ] {
            if !result.valid {
                return Ok(result);
            }
        }
        Ok(ValidationResult::success("retry", transaction_id))
    }

    async fn compute_acknowledge_validation(&self, transaction_id: &str) -> CacheResult {
        let existence = self.validate_exception_exists(transaction_id).await?;
        if !existence.valid {
            return Ok(existence);
        }
        let status = self.validate_exception_status(transaction_id).await?;
        if !status.valid {
            return Ok(status);
        }
        Ok(ValidationResult::success("acknowledge", transaction_id))
    }

    async fn compute_cancel_validation(&self, transaction_id: &str) -> CacheResult {
        let existence = self.validate_exception_exists(transaction_id).await?;
        if !existence.valid {
            return Ok(existence);
        }

        let latest = self
            .store
            .latest_attempt(transaction_id)
            .await
            .map_err(|e| ValidationCacheError(Arc::new(e)))?;
        match latest {
            Some(attempt) if attempt.status == RetryStatus::Pending => {
                Ok(ValidationResult::success("cancel", transaction_id))
            }
            _ => Ok(ValidationResult::failure(
                "cancel",
                transaction_id,
                vec![ValidationError::new(
                    "NO_PENDING_RETRY_TO_CANCEL",
                    format!("No pending retry found to cancel for transaction: {transaction_id}"),
                )],
            )),
        }
    }

    /// Evict every cached entry for a transaction, per-check and
    /// per-operation alike.
    pub async fn invalidate(&self, transaction_id: &str) {
        debug!(transaction_id = %transaction_id, "Invalidating validation cache entries");
        let key = transaction_id.to_string();
        self.existence.invalidate(&key).await;
        self.retryable.invalidate(&key).await;
        self.retry_count.invalidate(&key).await;
        self.pending_retry.invalidate(&key).await;
        self.status.invalidate(&key).await;
        for operation in OperationType::ALL {
            self.operation.invalidate(&(key.clone(), operation)).await;
        }
    }

    /// Evict one composite operation entry.
    pub async fn invalidate_operation(&self, transaction_id: &str, operation: OperationType) {
        self.operation
            .invalidate(&(transaction_id.to_string(), operation))
            .await;
    }

    /// Full flush, for operational recovery from suspected cache
    /// corruption. Safe to call at any time.
    pub fn clear_all(&self) {
        info!("Clearing all validation caches");
        self.existence.invalidate_all();
        self.retryable.invalidate_all();
        self.retry_count.invalidate_all();
        self.pending_retry.invalidate_all();
        self.status.invalidate_all();
        self.operation.invalidate_all();
    }
}
