use crate::config::ConcurrencyConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors surfaced when admission is denied. Callers translate these into
/// a backpressure signal; nothing is queued beyond the bounded wait.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("System is at maximum capacity. Please try again later.")]
    SystemAtCapacity,

    #[error("Too many concurrent operations for caller {caller}. Please wait for existing operations to complete.")]
    CallerAtCapacity { caller: String },
}

/// Bookkeeping entry for one admitted operation.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub operation_id: String,
    pub operation_type: String,
    pub caller: String,
    pub started_at: DateTime<Utc>,
}

/// System-wide admission snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ConcurrencyStats {
    pub active_operations: usize,
    pub max_system_operations: usize,
    pub max_operations_per_caller: usize,
    pub active_callers: usize,
    pub available_system_permits: usize,
}

/// Per-caller admission snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CallerConcurrencyStats {
    pub caller: String,
    pub active_operations: usize,
    pub max_operations: usize,
}

struct ControllerState {
    config: ConcurrencyConfig,
    system_semaphore: Arc<Semaphore>,
    caller_semaphores: DashMap<String, Arc<Semaphore>>,
    active_operations: AtomicUsize,
    caller_active: DashMap<String, Arc<AtomicUsize>>,
    active_details: DashMap<String, ActiveOperation>,
}

/// Issues and revokes operation permits.
///
/// One instance per process with explicit lifecycle; per-caller
/// semaphores are created lazily and never removed (bounded by distinct
/// caller cardinality).
#[derive(Clone)]
pub struct AdmissionController {
    state: Arc<ControllerState>,
}

impl AdmissionController {
    pub fn new(config: ConcurrencyConfig) -> Self {
        let system_semaphore = Arc::new(Semaphore::new(config.max_concurrent_operations_total));
        Self {
            state: Arc::new(ControllerState {
                config,
                system_semaphore,
                caller_semaphores: DashMap::new(),
                active_operations: AtomicUsize::new(0),
                caller_active: DashMap::new(),
                active_details: DashMap::new(),
            }),
        }
    }

    /// Acquire one system-wide slot and one per-caller slot.
    ///
    /// The system slot is taken first with the longer bounded wait; any
    /// failure past that point releases it before the error propagates.
    pub async fn acquire_operation_permit(
        &self,
        operation_type: &str,
        caller: &str,
    ) -> Result<OperationPermit, AdmissionError> {
        let state = &self.state;
        debug!(operation_type, caller, "Attempting to acquire operation permit");

        let system_permit = match tokio::time::timeout(
            state.config.system_acquire_timeout,
            state.system_semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            _ => {
                warn!(
                    operation_type,
                    caller, "System concurrency limit reached, rejecting operation"
                );
                return Err(AdmissionError::SystemAtCapacity);
            }
        };

        let caller_semaphore = state
            .caller_semaphores
            .entry(caller.to_string())
            .or_insert_with(|| {
                Arc::new(Semaphore::new(state.config.max_concurrent_operations_per_user))
            })
            .clone();

        let caller_permit = match tokio::time::timeout(
            state.config.user_acquire_timeout,
            caller_semaphore.acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            _ => {
                // System permit released by drop before the error surfaces.
                drop(system_permit);
                warn!(
                    operation_type,
                    caller, "Caller concurrency limit reached, rejecting operation"
                );
                return Err(AdmissionError::CallerAtCapacity {
                    caller: caller.to_string(),
                });
            }
        };

        let operation_id = Uuid::new_v4().to_string();
        let details = ActiveOperation {
            operation_id: operation_id.clone(),
            operation_type: operation_type.to_string(),
            caller: caller.to_string(),
            started_at: Utc::now(),
        };

        state.active_details.insert(operation_id.clone(), details);
        state.active_operations.fetch_add(1, Ordering::AcqRel);
        state
            .caller_active
            .entry(caller.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .fetch_add(1, Ordering::AcqRel);

        info!(
            operation_type,
            caller,
            operation_id = %operation_id,
            active = state.active_operations.load(Ordering::Acquire),
            "Operation permit acquired"
        );

        Ok(OperationPermit {
            state: Arc::clone(state),
            operation_id,
            caller: caller.to_string(),
            slots: Some((system_permit, caller_permit)),
        })
    }

    /// Release a permit explicitly. Equivalent to `permit.release()`;
    /// releasing twice (or dropping afterwards) is a no-op.
    pub fn release_operation_permit(&self, permit: &mut OperationPermit) {
        permit.release();
    }

    /// True when active operations exceed 80% of the system limit.
    /// Intended for upstream load-shedding decisions, not enforced here.
    pub fn is_system_near_capacity(&self) -> bool {
        let max = self.state.config.max_concurrent_operations_total;
        if max == 0 {
            return true;
        }
        let active = self.state.active_operations.load(Ordering::Acquire);
        (active as f64) / (max as f64) > 0.8
    }

    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            active_operations: self.state.active_operations.load(Ordering::Acquire),
            max_system_operations: self.state.config.max_concurrent_operations_total,
            max_operations_per_caller: self.state.config.max_concurrent_operations_per_user,
            active_callers: self.state.caller_active.len(),
            available_system_permits: self.state.system_semaphore.available_permits(),
        }
    }

    pub fn caller_stats(&self, caller: &str) -> CallerConcurrencyStats {
        CallerConcurrencyStats {
            caller: caller.to_string(),
            active_operations: self
                .state
                .caller_active
                .get(caller)
                .map_or(0, |c| c.load(Ordering::Acquire)),
            max_operations: self.state.config.max_concurrent_operations_per_user,
        }
    }

    pub fn active_operations(&self) -> Vec<ActiveOperation> {
        self.state
            .active_details
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }
}

/// Permit owning one system slot and one per-caller slot.
///
/// Release is idempotent; dropping an unreleased permit releases it as a
/// safety net so an early return can never leak a slot.
pub struct OperationPermit {
    state: Arc<ControllerState>,
    operation_id: String,
    caller: String,
    slots: Option<(OwnedSemaphorePermit, OwnedSemaphorePermit)>,
}

impl OperationPermit {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Release both slots and clear bookkeeping. Safe to call repeatedly.
    pub fn release(&mut self) {
        let Some(slots) = self.slots.take() else {
            return;
        };
        drop(slots);

        if let Some(details) = self.state.active_details.remove(&self.operation_id) {
            let duration_ms = (Utc::now() - details.1.started_at).num_milliseconds();
            info!(
                operation_type = %details.1.operation_type,
                caller = %self.caller,
                duration_ms,
                "Operation permit released"
            );
        }
        self.state.active_operations.fetch_sub(1, Ordering::AcqRel);
        if let Some(counter) = self.state.caller_active.get(&self.caller) {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(total: usize, per_user: usize) -> ConcurrencyConfig {
        ConcurrencyConfig {
            max_concurrent_operations_total: total,
            max_concurrent_operations_per_user: per_user,
            system_acquire_timeout: Duration::from_millis(50),
            user_acquire_timeout: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release_cycle() {
        let controller = AdmissionController::new(config(2, 2));

        let mut permit = controller
            .acquire_operation_permit("retry", "alice")
            .await
            .unwrap();
        assert_eq!(controller.stats().active_operations, 1);
        assert_eq!(controller.caller_stats("alice").active_operations, 1);

        permit.release();
        assert_eq!(controller.stats().active_operations, 0);
        assert_eq!(controller.stats().available_system_permits, 2);
    }

    #[tokio::test]
    async fn test_system_capacity_rejects_third_caller() {
        let controller = AdmissionController::new(config(2, 2));

        let _one = controller
            .acquire_operation_permit("retry", "alice")
            .await
            .unwrap();
        let _two = controller
            .acquire_operation_permit("retry", "bob")
            .await
            .unwrap();

        let third = controller.acquire_operation_permit("retry", "carol").await;
        assert!(matches!(third, Err(AdmissionError::SystemAtCapacity)));
    }

    #[tokio::test]
    async fn test_blocked_caller_succeeds_after_release() {
        let controller = AdmissionController::new(config(2, 2));

        let mut one = controller
            .acquire_operation_permit("retry", "alice")
            .await
            .unwrap();
        let _two = controller
            .acquire_operation_permit("retry", "bob")
            .await
            .unwrap();

        assert!(matches!(
            controller.acquire_operation_permit("retry", "carol").await,
            Err(AdmissionError::SystemAtCapacity)
        ));

        one.release();
        let retried = controller.acquire_operation_permit("retry", "carol").await;
        assert!(retried.is_ok());
    }

    #[tokio::test]
    async fn test_caller_limit_releases_system_permit() {
        let controller = AdmissionController::new(config(10, 1));

        let _held = controller
            .acquire_operation_permit("retry", "alice")
            .await
            .unwrap();

        let denied = controller.acquire_operation_permit("retry", "alice").await;
        assert!(matches!(
            denied,
            Err(AdmissionError::CallerAtCapacity { .. })
        ));

        // The system slot taken for the denied acquisition was handed back.
        assert_eq!(controller.stats().available_system_permits, 9);
        // A different caller is unaffected.
        assert!(controller
            .acquire_operation_permit("retry", "bob")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let controller = AdmissionController::new(config(2, 2));

        let mut permit = controller
            .acquire_operation_permit("retry", "alice")
            .await
            .unwrap();
        permit.release();
        permit.release();
        controller.release_operation_permit(&mut permit);

        assert_eq!(controller.stats().active_operations, 0);
        assert_eq!(controller.stats().available_system_permits, 2);
        assert_eq!(controller.caller_stats("alice").active_operations, 0);
    }

    #[tokio::test]
    async fn test_drop_releases_slots() {
        let controller = AdmissionController::new(config(1, 1));

        {
            let _permit = controller
                .acquire_operation_permit("retry", "alice")
                .await
                .unwrap();
            assert_eq!(controller.stats().available_system_permits, 0);
        }

        assert_eq!(controller.stats().available_system_permits, 1);
        assert_eq!(controller.stats().active_operations, 0);
    }

    #[tokio::test]
    async fn test_near_capacity_threshold() {
        let controller = AdmissionController::new(config(10, 10));
        assert!(!controller.is_system_near_capacity());

        let mut permits = Vec::new();
        for i in 0..9 {
            permits.push(
                controller
                    .acquire_operation_permit("retry", &format!("caller-{i}"))
                    .await
                    .unwrap(),
            );
        }
        assert!(controller.is_system_near_capacity());
    }
}
