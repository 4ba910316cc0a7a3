//! Shared application state for the web API.

use crate::cache::ValidationCacheService;
use crate::client::ConnectionManager;
use crate::concurrency::AdmissionController;
use crate::orchestration::{ExceptionManagementService, RetryOrchestrator};
use crate::store::ExceptionStore;
use axum::http::HeaderMap;
use std::sync::Arc;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ExceptionStore>,
    pub orchestrator: RetryOrchestrator,
    pub management: Arc<ExceptionManagementService>,
    pub admission: Arc<AdmissionController>,
    pub validation: Arc<ValidationCacheService>,
    pub connection: ConnectionManager,
}

/// Caller identity for admission control. Authentication itself is
/// handled upstream; an absent header degrades to a shared identity.
pub fn caller_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_identity_fallback() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_identity(&headers), "anonymous");

        headers.insert("x-user-id", "alice".parse().unwrap());
        assert_eq!(caller_identity(&headers), "alice");
    }
}
