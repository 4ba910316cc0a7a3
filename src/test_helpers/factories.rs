//! Model factories for tests.

use crate::models::{
    ExceptionCategory, ExceptionSeverity, InterfaceException, InterfaceType,
    NewInterfaceException,
};
use crate::state_machine::states::ExceptionStatus;
use chrono::Utc;

/// A retryable exception in status `NEW`, as produced by intake capture.
pub fn new_exception(transaction_id: &str) -> NewInterfaceException {
    NewInterfaceException {
        transaction_id: transaction_id.to_string(),
        external_id: Some(format!("EXT-{transaction_id}")),
        interface_type: InterfaceType::Order,
        operation: "CREATE_ORDER".to_string(),
        exception_reason: "downstream rejected the order".to_string(),
        severity: ExceptionSeverity::Medium,
        category: ExceptionCategory::SystemError,
        retryable: true,
        max_retries: 5,
        customer_id: Some("CUST-1".to_string()),
        location_code: Some("LOC-7".to_string()),
        timestamp: Utc::now(),
    }
}

/// A fully materialized exception record, bypassing the store.
pub fn captured_exception(transaction_id: &str, external_id: Option<&str>) -> InterfaceException {
    let now = Utc::now();
    InterfaceException {
        id: 1,
        transaction_id: transaction_id.to_string(),
        external_id: external_id.map(str::to_string),
        interface_type: InterfaceType::Order,
        operation: "CREATE_ORDER".to_string(),
        exception_reason: "downstream rejected the order".to_string(),
        status: ExceptionStatus::New,
        severity: ExceptionSeverity::Medium,
        category: ExceptionCategory::SystemError,
        retryable: true,
        retry_count: 0,
        max_retries: 5,
        customer_id: Some("CUST-1".to_string()),
        location_code: Some("LOC-7".to_string()),
        timestamp: now,
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
    }
}
