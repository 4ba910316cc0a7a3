use super::errors::{StateMachineError, StateMachineResult};
use super::events::ExceptionEvent;
use super::states::ExceptionStatus;
use crate::events::{CollectorEvent, EventPublisher};
use crate::models::InterfaceException;
use crate::store::ExceptionStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Exception lifecycle state machine.
///
/// Validates the requested edge against the current persisted status,
/// applies the matching store mutation, and emits a status-changed event
/// for cache invalidation and subscriptions.
pub struct ExceptionStateMachine {
    store: Arc<dyn ExceptionStore>,
    event_publisher: EventPublisher,
}

impl ExceptionStateMachine {
    pub fn new(store: Arc<dyn ExceptionStore>, event_publisher: EventPublisher) -> Self {
        Self {
            store,
            event_publisher,
        }
    }

    /// Get the current persisted status of the exception
    pub async fn current_state(&self, transaction_id: &str) -> StateMachineResult<ExceptionStatus> {
        let exception = self
            .store
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| StateMachineError::NotFound(transaction_id.to_string()))?;
        Ok(exception.status)
    }

    /// Attempt to transition the exception through the given event.
    pub async fn transition(
        &self,
        transaction_id: &str,
        event: ExceptionEvent,
    ) -> StateMachineResult<InterfaceException> {
        let current = self.current_state(transaction_id).await?;
        let target = Self::determine_target_state(current, &event)?;

        let updated = match &event {
            ExceptionEvent::Acknowledge {
                acknowledged_by,
                notes,
            } => {
                self.store
                    .acknowledge(transaction_id, acknowledged_by, notes.clone())
                    .await?
            }
            ExceptionEvent::Resolve {
                resolved_by,
                method,
                notes,
            } => {
                self.store
                    .resolve(transaction_id, resolved_by, *method, notes.clone())
                    .await?
            }
            ExceptionEvent::RetrySucceeded => {
                self.store.record_retry_result(transaction_id, true).await?
            }
            ExceptionEvent::RetryFailed => {
                self.store
                    .record_retry_result(transaction_id, false)
                    .await?
            }
            ExceptionEvent::Escalate | ExceptionEvent::Close => {
                self.store.update_status(transaction_id, target).await?
            }
        };

        info!(
            transaction_id = %transaction_id,
            from = %current,
            to = %updated.status,
            event = event.event_type(),
            "Exception status transition applied"
        );

        if let Err(e) = self.event_publisher.publish(CollectorEvent::ExceptionStatusChanged {
            transaction_id: transaction_id.to_string(),
            from: current,
            to: updated.status,
        }) {
            warn!(transaction_id = %transaction_id, error = %e, "Failed to publish status change event");
        }

        Ok(updated)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current: ExceptionStatus,
        event: &ExceptionEvent,
    ) -> StateMachineResult<ExceptionStatus> {
        use ExceptionStatus::*;

        let target = match (current, event) {
            // Operator takes ownership; also valid after a failed retry or escalation
            (New | RetriedFailed | Escalated, ExceptionEvent::Acknowledge { .. }) => Acknowledged,

            // Any non-terminal exception can be resolved
            (state, ExceptionEvent::Resolve { .. }) if !state.is_terminal() => Resolved,

            // Retry completion edges originate from the retry-eligible set,
            // or from Acknowledged when an operator acked a pending retry
            (New | RetriedFailed | Escalated | Acknowledged, ExceptionEvent::RetrySucceeded) => {
                RetriedSuccess
            }
            (New | RetriedFailed | Escalated | Acknowledged, ExceptionEvent::RetryFailed) => {
                RetriedFailed
            }

            (New | Acknowledged | RetriedFailed, ExceptionEvent::Escalate) => Escalated,

            (state, ExceptionEvent::Close) if !state.is_terminal() => Closed,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
