//! # Validation Cache
//!
//! Memoizes the multi-step eligibility checks that guard mutation
//! endpoints, keyed per transaction (and per operation type for the
//! composite result). Entries are evicted whenever the underlying
//! exception state changes so a stale "eligible" verdict can never
//! escape; over-invalidation is acceptable, false positives are not.

pub mod invalidation;
pub mod service;
pub mod validation;

pub use invalidation::CacheInvalidationListener;
pub use service::{ValidationCacheError, ValidationCacheService};
pub use validation::{OperationType, ValidationError, ValidationResult};
