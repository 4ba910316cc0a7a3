use crate::models::ResolutionMethod;
use serde::{Deserialize, Serialize};

/// Events that can trigger exception status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ExceptionEvent {
    /// An operator takes ownership of the exception
    Acknowledge {
        acknowledged_by: String,
        notes: Option<String>,
    },
    /// An operator or automation resolves the exception
    Resolve {
        resolved_by: String,
        method: ResolutionMethod,
        notes: Option<String>,
    },
    /// A retry attempt completed successfully
    RetrySucceeded,
    /// A retry attempt failed
    RetryFailed,
    /// Escalate for out-of-band handling
    Escalate,
    /// Administratively close the exception
    Close,
}

impl ExceptionEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Acknowledge { .. } => "acknowledge",
            Self::Resolve { .. } => "resolve",
            Self::RetrySucceeded => "retry_succeeded",
            Self::RetryFailed => "retry_failed",
            Self::Escalate => "escalate",
            Self::Close => "close",
        }
    }
}
