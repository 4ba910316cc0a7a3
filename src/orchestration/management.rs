use crate::models::{InterfaceException, ResolutionMethod};
use crate::state_machine::{ExceptionEvent, ExceptionStateMachine, StateMachineError};
use crate::store::StoreError;
use serde::Deserialize;
use tracing::info;

/// Errors from management operations, shaped for API mapping.
#[derive(Debug, thiserror::Error)]
pub enum ManagementError {
    #[error("Exception not found for transaction: {0}")]
    NotFound(String),

    #[error("Operation not allowed: {0}")]
    NotAllowed(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StateMachineError> for ManagementError {
    fn from(e: StateMachineError) -> Self {
        match e {
            StateMachineError::NotFound(txn) => Self::NotFound(txn),
            StateMachineError::InvalidTransition { .. } => Self::NotAllowed(e.to_string()),
            StateMachineError::Store(StoreError::NotFound { transaction_id }) => {
                Self::NotFound(transaction_id)
            }
            StateMachineError::Store(store) => Self::Store(store),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcknowledgeRequest {
    pub acknowledged_by: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
    pub resolution_method: ResolutionMethod,
    pub resolution_notes: Option<String>,
}

/// Acknowledge/resolve/escalate/close operations over the state machine.
pub struct ExceptionManagementService {
    machine: ExceptionStateMachine,
}

impl ExceptionManagementService {
    pub fn new(machine: ExceptionStateMachine) -> Self {
        Self { machine }
    }

    pub async fn acknowledge_exception(
        &self,
        transaction_id: &str,
        request: AcknowledgeRequest,
    ) -> Result<InterfaceException, ManagementError> {
        info!(
            transaction_id = %transaction_id,
            acknowledged_by = %request.acknowledged_by,
            "Acknowledging exception"
        );

        let updated = self
            .machine
            .transition(
                transaction_id,
                ExceptionEvent::Acknowledge {
                    acknowledged_by: request.acknowledged_by,
                    notes: request.notes,
                },
            )
            .await?;
        Ok(updated)
    }

    pub async fn resolve_exception(
        &self,
        transaction_id: &str,
        request: ResolveRequest,
    ) -> Result<InterfaceException, ManagementError> {
        info!(
            transaction_id = %transaction_id,
            resolved_by = %request.resolved_by,
            method = %request.resolution_method,
            "Resolving exception"
        );

        let updated = self
            .machine
            .transition(
                transaction_id,
                ExceptionEvent::Resolve {
                    resolved_by: request.resolved_by,
                    method: request.resolution_method,
                    notes: request.resolution_notes,
                },
            )
            .await?;
        Ok(updated)
    }

    pub async fn escalate_exception(
        &self,
        transaction_id: &str,
    ) -> Result<InterfaceException, ManagementError> {
        info!(transaction_id = %transaction_id, "Escalating exception");
        Ok(self
            .machine
            .transition(transaction_id, ExceptionEvent::Escalate)
            .await?)
    }

    pub async fn close_exception(
        &self,
        transaction_id: &str,
    ) -> Result<InterfaceException, ManagementError> {
        info!(transaction_id = %transaction_id, "Closing exception");
        Ok(self
            .machine
            .transition(transaction_id, ExceptionEvent::Close)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPublisher;
    use crate::state_machine::states::ExceptionStatus;
    use crate::store::{ExceptionStore, InMemoryExceptionStore};
    use crate::test_helpers::factories::new_exception;
    use std::sync::Arc;

    async fn service() -> (ExceptionManagementService, Arc<InMemoryExceptionStore>) {
        let store = Arc::new(InMemoryExceptionStore::new());
        store.insert(new_exception("TXN-1")).await.unwrap();
        let machine = ExceptionStateMachine::new(store.clone(), EventPublisher::new(16));
        (ExceptionManagementService::new(machine), store)
    }

    #[tokio::test]
    async fn test_acknowledge_then_resolve() {
        let (service, _) = service().await;

        let acked = service
            .acknowledge_exception(
                "TXN-1",
                AcknowledgeRequest {
                    acknowledged_by: "ops".to_string(),
                    notes: Some("looking into it".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(acked.status, ExceptionStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("ops"));

        let resolved = service
            .resolve_exception(
                "TXN-1",
                ResolveRequest {
                    resolved_by: "ops".to_string(),
                    resolution_method: ResolutionMethod::ManualResolution,
                    resolution_notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, ExceptionStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_status_rejects_management() {
        let (service, store) = service().await;
        store
            .update_status("TXN-1", ExceptionStatus::Closed)
            .await
            .unwrap();

        let result = service
            .acknowledge_exception(
                "TXN-1",
                AcknowledgeRequest {
                    acknowledged_by: "ops".to_string(),
                    notes: None,
                },
            )
            .await;
        assert!(matches!(result, Err(ManagementError::NotAllowed(_))));
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_not_found() {
        let (service, _) = service().await;
        let result = service.escalate_exception("TXN-404").await;
        assert!(matches!(result, Err(ManagementError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_escalate_and_close() {
        let (service, _) = service().await;

        let escalated = service.escalate_exception("TXN-1").await.unwrap();
        assert_eq!(escalated.status, ExceptionStatus::Escalated);

        let closed = service.close_exception("TXN-1").await.unwrap();
        assert_eq!(closed.status, ExceptionStatus::Closed);

        // Closed is terminal
        assert!(service.close_exception("TXN-1").await.is_err());
    }
}
