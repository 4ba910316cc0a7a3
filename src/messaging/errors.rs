/// Errors surfaced by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Queue backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),
}
