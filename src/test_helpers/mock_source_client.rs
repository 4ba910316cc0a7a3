//! Scriptable source-service client.

use crate::client::traits::{ClientError, PayloadResponse, SourceServiceClient, SubmitResult};
use crate::models::{InterfaceException, InterfaceType};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

pub struct MockSourceClient {
    interface_type: InterfaceType,
    payload_available: AtomicBool,
    submit_status: AtomicU16,
    pub payload_calls: AtomicU32,
    pub submit_calls: AtomicU32,
}

impl MockSourceClient {
    /// Payload retrievable, submissions answered with 200.
    pub fn succeeding(interface_type: InterfaceType) -> Self {
        Self {
            interface_type,
            payload_available: AtomicBool::new(true),
            submit_status: AtomicU16::new(200),
            payload_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
        }
    }

    /// Payload retrievable, submissions rejected with the given status.
    pub fn failing_submit(interface_type: InterfaceType, status: u16) -> Self {
        let client = Self::succeeding(interface_type);
        client.submit_status.store(status, Ordering::Release);
        client
    }

    /// Payload lookups answer "not retrieved".
    pub fn payload_unavailable(interface_type: InterfaceType) -> Self {
        let client = Self::succeeding(interface_type);
        client.payload_available.store(false, Ordering::Release);
        client
    }

    pub fn set_submit_status(&self, status: u16) {
        self.submit_status.store(status, Ordering::Release);
    }
}

#[async_trait]
impl SourceServiceClient for MockSourceClient {
    fn interface_type(&self) -> InterfaceType {
        self.interface_type
    }

    async fn get_original_payload(&self, exception: &InterfaceException) -> PayloadResponse {
        self.payload_calls.fetch_add(1, Ordering::AcqRel);
        if self.payload_available.load(Ordering::Acquire) {
            PayloadResponse::retrieved(
                json!({"transactionId": exception.transaction_id, "payload": "original"}),
                "mock-source",
            )
        } else {
            PayloadResponse::not_retrieved("Payload not retrieved, reason: unavailable", "mock-source")
        }
    }

    async fn submit_retry(
        &self,
        _exception: &InterfaceException,
        _payload: &serde_json::Value,
    ) -> Result<SubmitResult, ClientError> {
        self.submit_calls.fetch_add(1, Ordering::AcqRel);
        Ok(SubmitResult {
            status_code: self.submit_status.load(Ordering::Acquire),
            body: Some(json!({"accepted": true})),
        })
    }
}
