//! In-memory `ExceptionStore` used by tests and local development.
//!
//! A single async mutex guards all state, which trivially gives
//! `begin_attempt` the same atomicity the Postgres implementation gets
//! from a row lock.

use super::{ExceptionStore, RetryDenialReason, StoreError, StoreResult};
use crate::models::{
    ExceptionSummary, InterfaceException, NewInterfaceException, ResolutionMethod, RetryAttempt,
    RetryOutcome, RetryStatistics, RetryStatus,
};
use crate::state_machine::states::ExceptionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_exception_id: i64,
    next_attempt_id: i64,
    by_transaction: HashMap<String, InterfaceException>,
    attempts: HashMap<i64, Vec<RetryAttempt>>,
}

/// Mutex-backed store with full trait coverage.
#[derive(Default)]
pub struct InMemoryExceptionStore {
    inner: Mutex<Inner>,
}

impl InMemoryExceptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn count_grouped<K: ToString>(items: impl Iterator<Item = K>) -> Vec<(String, u64)> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for item in items {
        *counts.entry(item.to_string()).or_insert(0) += 1;
    }
    let mut out: Vec<(String, u64)> = counts.into_iter().collect();
    out.sort();
    out
}

#[async_trait]
impl ExceptionStore for InMemoryExceptionStore {
    async fn insert(&self, new: NewInterfaceException) -> StoreResult<InterfaceException> {
        let mut inner = self.inner.lock().await;

        if inner.by_transaction.contains_key(&new.transaction_id) {
            return Err(StoreError::DuplicateTransaction(new.transaction_id));
        }

        inner.next_exception_id += 1;
        let now = Utc::now();
        let exception = InterfaceException {
            id: inner.next_exception_id,
            transaction_id: new.transaction_id.clone(),
            external_id: new.external_id,
            interface_type: new.interface_type,
            operation: new.operation,
            exception_reason: new.exception_reason,
            status: ExceptionStatus::New,
            severity: new.severity,
            category: new.category,
            retryable: new.retryable,
            retry_count: 0,
            max_retries: new.max_retries,
            customer_id: new.customer_id,
            location_code: new.location_code,
            timestamp: new.timestamp,
            processed_at: Some(now),
            acknowledged_at: None,
            acknowledged_by: None,
            acknowledgment_notes: None,
            last_retry_at: None,
            resolved_at: None,
            resolved_by: None,
            resolution_method: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
        };

        let id = exception.id;
        inner
            .by_transaction
            .insert(exception.transaction_id.clone(), exception.clone());
        inner.attempts.insert(id, Vec::new());
        Ok(exception)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<InterfaceException>> {
        let inner = self.inner.lock().await;
        Ok(inner.by_transaction.get(transaction_id).cloned())
    }

    async fn find_related_by_customer(
        &self,
        customer_id: &str,
        exclude_transaction_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<InterfaceException>> {
        let inner = self.inner.lock().await;
        let mut related: Vec<InterfaceException> = inner
            .by_transaction
            .values()
            .filter(|e| {
                e.customer_id.as_deref() == Some(customer_id)
                    && e.transaction_id != exclude_transaction_id
            })
            .cloned()
            .collect();
        related.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        related.truncate(limit.max(0) as usize);
        Ok(related)
    }

    async fn search(&self, query: &str, limit: i64) -> StoreResult<Vec<InterfaceException>> {
        let needle = query.to_lowercase();
        let inner = self.inner.lock().await;
        let mut hits: Vec<InterfaceException> = inner
            .by_transaction
            .values()
            .filter(|e| {
                e.exception_reason.to_lowercase().contains(&needle)
                    || e.operation.to_lowercase().contains(&needle)
                    || e.external_id
                        .as_deref()
                        .is_some_and(|ext| ext.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<ExceptionSummary> {
        let inner = self.inner.lock().await;
        let in_range: Vec<&InterfaceException> = inner
            .by_transaction
            .values()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .collect();

        Ok(ExceptionSummary {
            total: in_range.len() as u64,
            by_interface_type: count_grouped(in_range.iter().map(|e| e.interface_type)),
            by_severity: count_grouped(in_range.iter().map(|e| e.severity)),
            by_status: count_grouped(in_range.iter().map(|e| e.status)),
        })
    }

    async fn update_status(
        &self,
        transaction_id: &str,
        to: ExceptionStatus,
    ) -> StoreResult<InterfaceException> {
        let mut inner = self.inner.lock().await;
        let exception = inner.by_transaction.get_mut(transaction_id).ok_or_else(|| {
            StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            }
        })?;
        exception.status = to;
        exception.updated_at = Utc::now();
        Ok(exception.clone())
    }

    async fn acknowledge(
        &self,
        transaction_id: &str,
        acknowledged_by: &str,
        notes: Option<String>,
    ) -> StoreResult<InterfaceException> {
        let mut inner = self.inner.lock().await;
        let exception = inner.by_transaction.get_mut(transaction_id).ok_or_else(|| {
            StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            }
        })?;

        let now = Utc::now();
        exception.status = ExceptionStatus::Acknowledged;
        exception.acknowledged_at = Some(now);
        exception.acknowledged_by = Some(acknowledged_by.to_string());
        exception.acknowledgment_notes = notes;
        exception.updated_at = now;
        Ok(exception.clone())
    }

    async fn resolve(
        &self,
        transaction_id: &str,
        resolved_by: &str,
        method: ResolutionMethod,
        notes: Option<String>,
    ) -> StoreResult<InterfaceException> {
        let mut inner = self.inner.lock().await;
        let exception = inner.by_transaction.get_mut(transaction_id).ok_or_else(|| {
            StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            }
        })?;

        let now = Utc::now();
        exception.status = ExceptionStatus::Resolved;
        exception.resolved_at = Some(now);
        exception.resolved_by = Some(resolved_by.to_string());
        exception.resolution_method = Some(method);
        exception.resolution_notes = notes;
        exception.updated_at = now;
        Ok(exception.clone())
    }

    async fn record_retry_result(
        &self,
        transaction_id: &str,
        success: bool,
    ) -> StoreResult<InterfaceException> {
        let mut inner = self.inner.lock().await;
        let exception = inner.by_transaction.get_mut(transaction_id).ok_or_else(|| {
            StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            }
        })?;

        let now = Utc::now();
        if success {
            exception.status = ExceptionStatus::RetriedSuccess;
            exception.resolved_at = Some(now);
            exception.resolution_method = Some(ResolutionMethod::RetrySuccess);
        } else {
            exception.status = ExceptionStatus::RetriedFailed;
        }
        exception.updated_at = now;
        Ok(exception.clone())
    }

    async fn begin_attempt(
        &self,
        transaction_id: &str,
        initiated_by: &str,
    ) -> StoreResult<RetryAttempt> {
        let mut inner = self.inner.lock().await;

        let exception = inner.by_transaction.get(transaction_id).ok_or_else(|| {
            StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            }
        })?;

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

        let exception_id = exception.id;
        let (has_pending, attempt_number) = {
            let attempts = inner.attempts.entry(exception_id).or_default();
            (
                attempts.iter().any(|a| a.status == RetryStatus::Pending),
                attempts.iter().map(|a| a.attempt_number).max().unwrap_or(0) + 1,
            )
        };
        if has_pending {
            return Err(StoreError::RetryDenied {
                transaction_id: transaction_id.to_string(),
                reason: RetryDenialReason::PendingAttemptExists,
            });
        }

        inner.next_attempt_id += 1;
        let now = Utc::now();
        let attempt = RetryAttempt {
            id: inner.next_attempt_id,
            exception_id,
            attempt_number,
            status: RetryStatus::Pending,
            initiated_by: initiated_by.to_string(),
            initiated_at: now,
            completed_at: None,
            result_success: None,
            result_message: None,
            result_response_code: None,
            result_error_details: None,
        };

        inner
            .attempts
            .entry(exception_id)
            .or_default()
            .push(attempt.clone());

        if let Some(exception) = inner.by_transaction.get_mut(transaction_id) {
            exception.retry_count += 1;
            exception.last_retry_at = Some(now);
            exception.updated_at = now;
        }

        Ok(attempt)
    }

    async fn complete_attempt(
        &self,
        transaction_id: &str,
        attempt_number: i32,
        outcome: RetryOutcome,
    ) -> StoreResult<RetryAttempt> {
        let mut inner = self.inner.lock().await;

        let exception_id = inner
            .by_transaction
            .get(transaction_id)
            .map(|e| e.id)
            .ok_or_else(|| StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            })?;

        let attempt = inner
            .attempts
            .get_mut(&exception_id)
            .and_then(|list| {
                list.iter_mut()
                    .find(|a| a.attempt_number == attempt_number)
            })
            .ok_or_else(|| StoreError::AttemptNotFound {
                transaction_id: transaction_id.to_string(),
                attempt_number,
            })?;

        attempt.status = if outcome.success {
            RetryStatus::Success
        } else {
            RetryStatus::Failed
        };
        attempt.completed_at = Some(Utc::now());
        attempt.result_success = Some(outcome.success);
        attempt.result_message = Some(outcome.message);
        attempt.result_response_code = outcome.response_code;
        attempt.result_error_details = outcome.error_details;

        Ok(attempt.clone())
    }

    async fn find_attempt(
        &self,
        transaction_id: &str,
        attempt_number: i32,
    ) -> StoreResult<Option<RetryAttempt>> {
        let inner = self.inner.lock().await;
        let Some(exception) = inner.by_transaction.get(transaction_id) else {
            return Ok(None);
        };
        Ok(inner
            .attempts
            .get(&exception.id)
            .and_then(|list| list.iter().find(|a| a.attempt_number == attempt_number))
            .cloned())
    }

    async fn list_attempts(&self, transaction_id: &str) -> StoreResult<Vec<RetryAttempt>> {
        let inner = self.inner.lock().await;
        let exception = inner.by_transaction.get(transaction_id).ok_or_else(|| {
            StoreError::NotFound {
                transaction_id: transaction_id.to_string(),
            }
        })?;
        let mut attempts = inner
            .attempts
            .get(&exception.id)
            .cloned()
            .unwrap_or_default();
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    async fn latest_attempt(&self, transaction_id: &str) -> StoreResult<Option<RetryAttempt>> {
        let attempts = self.list_attempts(transaction_id).await?;
        Ok(attempts.into_iter().max_by_key(|a| a.attempt_number))
    }

    async fn attempt_statistics(&self, transaction_id: &str) -> StoreResult<RetryStatistics> {
        let attempts = self.list_attempts(transaction_id).await?;
        let mut stats = RetryStatistics {
            total_attempts: attempts.len() as u64,
            ..Default::default()
        };
        for attempt in attempts {
            match attempt.status {
                RetryStatus::Success => stats.successful_attempts += 1,
                RetryStatus::Failed => stats.failed_attempts += 1,
                RetryStatus::Pending => stats.pending_attempts += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExceptionCategory, ExceptionSeverity, InterfaceType};

    fn new_exception(txn: &str) -> NewInterfaceException {
        NewInterfaceException {
            transaction_id: txn.to_string(),
            external_id: Some(format!("EXT-{txn}")),
            interface_type: InterfaceType::Order,
            operation: "CREATE_ORDER".to_string(),
            exception_reason: "downstream rejected the order".to_string(),
            severity: ExceptionSeverity::Medium,
            category: ExceptionCategory::SystemError,
            retryable: true,
            max_retries: 3,
            customer_id: Some("CUST-1".to_string()),
            location_code: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryExceptionStore::new();
        let created = store.insert(new_exception("TXN-1")).await.unwrap();
        assert_eq!(created.status, ExceptionStatus::New);
        assert_eq!(created.retry_count, 0);

        let found = store.find_by_transaction_id("TXN-1").await.unwrap();
        assert_eq!(found.unwrap().id, created.id);
        assert!(store
            .find_by_transaction_id("TXN-404")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_transaction_rejected() {
        let store = InMemoryExceptionStore::new();
        store.insert(new_exception("TXN-1")).await.unwrap();
        let result = store.insert(new_exception("TXN-1")).await;
        assert!(matches!(result, Err(StoreError::DuplicateTransaction(_))));
    }

    #[tokio::test]
    async fn test_begin_attempt_enforces_pending_invariant() {
        let store = InMemoryExceptionStore::new();
        store.insert(new_exception("TXN-1")).await.unwrap();

        let first = store.begin_attempt("TXN-1", "ops").await.unwrap();
        assert_eq!(first.attempt_number, 1);
        assert_eq!(first.status, RetryStatus::Pending);

        let second = store.begin_attempt("TXN-1", "ops").await;
        assert!(matches!(
            second,
            Err(StoreError::RetryDenied {
                reason: RetryDenialReason::PendingAttemptExists,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_begin_attempt_concurrent_single_winner() {
        let store = std::sync::Arc::new(InMemoryExceptionStore::new());
        store.insert(new_exception("TXN-1")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.begin_attempt("TXN-1", "ops").await
            }));
        }

        let winners = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| r.as_ref().unwrap().is_ok())
            .count();
        assert_eq!(winners, 1);

        let stats = store.attempt_statistics("TXN-1").await.unwrap();
        assert_eq!(stats.pending_attempts, 1);
        assert_eq!(stats.total_attempts, 1);
    }

    #[tokio::test]
    async fn test_begin_attempt_respects_retry_ceiling() {
        let store = InMemoryExceptionStore::new();
        store.insert(new_exception("TXN-1")).await.unwrap();

        for n in 1..=3 {
            let attempt = store.begin_attempt("TXN-1", "ops").await.unwrap();
            assert_eq!(attempt.attempt_number, n);
            store
                .complete_attempt("TXN-1", n, RetryOutcome::failure("failed", Some(500), None))
                .await
                .unwrap();
            store.record_retry_result("TXN-1", false).await.unwrap();
        }

        let denied = store.begin_attempt("TXN-1", "ops").await;
        assert!(matches!(
            denied,
            Err(StoreError::RetryDenied {
                reason: RetryDenialReason::RetryLimitExceeded { count: 3, max: 3 },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_record_retry_result_success_sets_resolution() {
        let store = InMemoryExceptionStore::new();
        store.insert(new_exception("TXN-1")).await.unwrap();
        store.begin_attempt("TXN-1", "ops").await.unwrap();

        let updated = store.record_retry_result("TXN-1", true).await.unwrap();
        assert_eq!(updated.status, ExceptionStatus::RetriedSuccess);
        assert!(updated.resolved_at.is_some());
        assert_eq!(
            updated.resolution_method,
            Some(ResolutionMethod::RetrySuccess)
        );

        let store2 = InMemoryExceptionStore::new();
        store2.insert(new_exception("TXN-2")).await.unwrap();
        store2.begin_attempt("TXN-2", "ops").await.unwrap();
        let failed = store2.record_retry_result("TXN-2", false).await.unwrap();
        assert_eq!(failed.status, ExceptionStatus::RetriedFailed);
        assert!(failed.resolved_at.is_none());
    }

    #[tokio::test]
    async fn test_search_and_related() {
        let store = InMemoryExceptionStore::new();
        store.insert(new_exception("TXN-1")).await.unwrap();
        store.insert(new_exception("TXN-2")).await.unwrap();

        let hits = store.search("rejected", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        let hits = store.search("EXT-TXN-1", 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        let related = store
            .find_related_by_customer("CUST-1", "TXN-1", 10)
            .await
            .unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].transaction_id, "TXN-2");
    }

    #[tokio::test]
    async fn test_summary_groups_counts() {
        let store = InMemoryExceptionStore::new();
        store.insert(new_exception("TXN-1")).await.unwrap();
        store.insert(new_exception("TXN-2")).await.unwrap();

        let from = Utc::now() - chrono::Duration::hours(1);
        let to = Utc::now() + chrono::Duration::hours(1);
        let summary = store.summary(from, to).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_interface_type, vec![("ORDER".to_string(), 2)]);
        assert_eq!(summary.by_status, vec![("NEW".to_string(), 2)]);
    }
}
