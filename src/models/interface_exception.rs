//! # Interface Exception Model
//!
//! Durable record of a failed interface operation between services.
//!
//! One row is created per failed operation once intake retries are
//! exhausted. Rows are mutated by the retry orchestrator and the
//! management endpoints but never physically deleted; the full history is
//! retained for audit.

use crate::state_machine::states::ExceptionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source interface that produced the failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterfaceType {
    Order,
    Collection,
    Distribution,
    PartnerOrder,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Order => write!(f, "ORDER"),
            Self::Collection => write!(f, "COLLECTION"),
            Self::Distribution => write!(f, "DISTRIBUTION"),
            Self::PartnerOrder => write!(f, "PARTNER_ORDER"),
        }
    }
}

impl std::str::FromStr for InterfaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER" => Ok(Self::Order),
            "COLLECTION" => Ok(Self::Collection),
            "DISTRIBUTION" => Ok(Self::Distribution),
            "PARTNER_ORDER" => Ok(Self::PartnerOrder),
            _ => Err(format!("Invalid interface type: {s}")),
        }
    }
}

/// Operational severity assigned at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ExceptionSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for ExceptionSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(format!("Invalid exception severity: {s}")),
        }
    }
}

/// Failure classification used for reporting and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionCategory {
    BusinessRule,
    Validation,
    SystemError,
    Timeout,
    Network,
}

impl fmt::Display for ExceptionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusinessRule => write!(f, "BUSINESS_RULE"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::SystemError => write!(f, "SYSTEM_ERROR"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Network => write!(f, "NETWORK"),
        }
    }
}

impl std::str::FromStr for ExceptionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUSINESS_RULE" => Ok(Self::BusinessRule),
            "VALIDATION" => Ok(Self::Validation),
            "SYSTEM_ERROR" => Ok(Self::SystemError),
            "TIMEOUT" => Ok(Self::Timeout),
            "NETWORK" => Ok(Self::Network),
            _ => Err(format!("Invalid exception category: {s}")),
        }
    }
}

/// How a resolved exception reached resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionMethod {
    RetrySuccess,
    ManualResolution,
    CustomerResolved,
    Automated,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetrySuccess => write!(f, "RETRY_SUCCESS"),
            Self::ManualResolution => write!(f, "MANUAL_RESOLUTION"),
            Self::CustomerResolved => write!(f, "CUSTOMER_RESOLVED"),
            Self::Automated => write!(f, "AUTOMATED"),
        }
    }
}

impl std::str::FromStr for ResolutionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RETRY_SUCCESS" => Ok(Self::RetrySuccess),
            "MANUAL_RESOLUTION" => Ok(Self::ManualResolution),
            "CUSTOMER_RESOLVED" => Ok(Self::CustomerResolved),
            "AUTOMATED" => Ok(Self::Automated),
            _ => Err(format!("Invalid resolution method: {s}")),
        }
    }
}

/// Durable record of one failed interface operation.
///
/// `transaction_id` is the caller-visible key; `retry_count` is
/// monotonically non-decreasing and bounded by `max_retries` once
/// enforcement kicks in at admission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceException {
    pub id: i64,
    pub transaction_id: String,
    pub external_id: Option<String>,
    pub interface_type: InterfaceType,
    pub operation: String,
    pub exception_reason: String,
    pub status: ExceptionStatus,
    pub severity: ExceptionSeverity,
    pub category: ExceptionCategory,
    pub retryable: bool,
    pub retry_count: i32,
    pub max_retries: i32,
    pub customer_id: Option<String>,
    pub location_code: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub acknowledgment_notes: Option<String>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_method: Option<ResolutionMethod>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterfaceException {
    /// Whether retry admission checks can pass for this record, ignoring
    /// the pending-attempt invariant (which only the store can answer).
    pub fn retry_admissible(&self) -> bool {
        self.retryable && self.status.allows_retry() && self.retry_count < self.max_retries
    }
}

/// New exception for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInterfaceException {
    pub transaction_id: String,
    pub external_id: Option<String>,
    pub interface_type: InterfaceType,
    pub operation: String,
    pub exception_reason: String,
    pub severity: ExceptionSeverity,
    pub category: ExceptionCategory,
    pub retryable: bool,
    pub max_retries: i32,
    pub customer_id: Option<String>,
    pub location_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counts over a time range, grouped by type, severity and status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExceptionSummary {
    pub total: u64,
    pub by_interface_type: Vec<(String, u64)>,
    pub by_severity: Vec<(String, u64)>,
    pub by_status: Vec<(String, u64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: ExceptionStatus, retryable: bool, retry_count: i32) -> InterfaceException {
        InterfaceException {
            id: 1,
            transaction_id: "TXN-1".to_string(),
            external_id: Some("ORD-1".to_string()),
            interface_type: InterfaceType::Order,
            operation: "CREATE_ORDER".to_string(),
            exception_reason: "downstream rejected".to_string(),
            status,
            severity: ExceptionSeverity::Medium,
            category: ExceptionCategory::SystemError,
            retryable,
            retry_count,
            max_retries: 5,
            customer_id: Some("CUST-9".to_string()),
            location_code: None,
            timestamp: Utc::now(),
            processed_at: None,
            acknowledged_at: None,
            acknowledged_by: None,
            acknowledgment_notes: None,
            last_retry_at: None,
            resolved_at: None,
            resolved_by: None,
            resolution_method: None,
            resolution_notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_retry_admissible() {
        assert!(sample(ExceptionStatus::New, true, 0).retry_admissible());
        assert!(sample(ExceptionStatus::RetriedFailed, true, 4).retry_admissible());
        assert!(!sample(ExceptionStatus::New, false, 0).retry_admissible());
        assert!(!sample(ExceptionStatus::Resolved, true, 0).retry_admissible());
        assert!(!sample(ExceptionStatus::New, true, 5).retry_admissible());
    }

    #[test]
    fn test_enum_serde_names() {
        let json = serde_json::to_string(&InterfaceType::PartnerOrder).unwrap();
        assert_eq!(json, "\"PARTNER_ORDER\"");
        assert_eq!(
            "BUSINESS_RULE".parse::<ExceptionCategory>().unwrap(),
            ExceptionCategory::BusinessRule
        );
    }
}
