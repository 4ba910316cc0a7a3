use crate::store::StoreError;

/// Errors from exception status transitions
#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("Invalid transition from {from:?} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Exception not found for transaction: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
