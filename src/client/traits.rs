use crate::models::{InterfaceException, InterfaceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors from source-service interactions.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Source service unavailable: {0}")]
    Unavailable(String),

    #[error("Source service rejected the request with status {status}: {message}")]
    Remote { status: u16, message: String },
}

/// Result of an original-payload lookup. Degraded outcomes (fallback mode,
/// remote failure) are carried in-band; this type never wraps an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadResponse {
    pub retrieved: bool,
    pub payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub source_service: String,
}

impl PayloadResponse {
    pub fn retrieved(payload: serde_json::Value, source_service: impl Into<String>) -> Self {
        Self {
            retrieved: true,
            payload: Some(payload),
            error_message: None,
            source_service: source_service.into(),
        }
    }

    pub fn not_retrieved(
        error_message: impl Into<String>,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            retrieved: false,
            payload: None,
            error_message: Some(error_message.into()),
            source_service: source_service.into(),
        }
    }
}

/// Response from submitting a retry to the source service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub status_code: u16,
    pub body: Option<serde_json::Value>,
}

impl SubmitResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Per-interface-type client for the service that originated a failed
/// operation. Domain-specific payload transformation lives behind this
/// trait, outside the retry core.
#[async_trait]
pub trait SourceServiceClient: Send + Sync {
    fn interface_type(&self) -> InterfaceType;

    /// Fetch the original payload for an exception. Never errors: a
    /// failure is reported as a non-retrieved response.
    async fn get_original_payload(&self, exception: &InterfaceException) -> PayloadResponse;

    /// Submit the retry with the recovered payload.
    async fn submit_retry(
        &self,
        exception: &InterfaceException,
        payload: &serde_json::Value,
    ) -> Result<SubmitResult, ClientError>;
}
