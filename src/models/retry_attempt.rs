//! # Retry Attempt Model
//!
//! One row per retry execution, owned by an `InterfaceException`. At most
//! one attempt per exception may be `PENDING` at any time; the store is
//! responsible for enforcing that atomically at creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state of a single retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStatus {
    Pending,
    Success,
    Failed,
}

impl fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for RetryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid retry status: {s}")),
        }
    }
}

/// Outcome details recorded when an attempt completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryOutcome {
    pub success: bool,
    pub message: String,
    pub response_code: Option<i32>,
    pub error_details: Option<String>,
}

impl RetryOutcome {
    pub fn success(message: impl Into<String>, response_code: Option<i32>) -> Self {
        Self {
            success: true,
            message: message.into(),
            response_code,
            error_details: None,
        }
    }

    pub fn failure(
        message: impl Into<String>,
        response_code: Option<i32>,
        error_details: Option<String>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            response_code,
            error_details,
        }
    }
}

/// A single retry execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub id: i64,
    pub exception_id: i64,
    /// 1-based, strictly increasing per exception.
    pub attempt_number: i32,
    pub status: RetryStatus,
    pub initiated_by: String,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_success: Option<bool>,
    pub result_message: Option<String>,
    pub result_response_code: Option<i32>,
    pub result_error_details: Option<String>,
}

impl RetryAttempt {
    pub fn is_pending(&self) -> bool {
        self.status == RetryStatus::Pending
    }
}

/// Counts by attempt status for one exception.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStatistics {
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub failed_attempts: u64,
    pub pending_attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!("PENDING".parse::<RetryStatus>().unwrap(), RetryStatus::Pending);
        assert_eq!(RetryStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = RetryOutcome::success("done", Some(200));
        assert!(ok.success);
        assert_eq!(ok.response_code, Some(200));
        assert!(ok.error_details.is_none());

        let failed = RetryOutcome::failure("boom", Some(502), Some("gateway".to_string()));
        assert!(!failed.success);
        assert_eq!(failed.error_details.as_deref(), Some("gateway"));
    }
}
