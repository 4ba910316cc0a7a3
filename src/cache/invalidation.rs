use super::service::ValidationCacheService;
use crate::events::{CollectorEvent, EventPublisher};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Subscribes to lifecycle events and evicts validation cache entries for
/// the affected transaction the moment its state machine moves.
///
/// Every trigger evicts all entries for the transaction: over-invalidating
/// costs a recomputation, while a surviving stale entry could answer
/// "eligible" after the state changed.
pub struct CacheInvalidationListener {
    cache: Arc<ValidationCacheService>,
}

impl CacheInvalidationListener {
    pub fn new(cache: Arc<ValidationCacheService>) -> Self {
        Self { cache }
    }

    /// Apply the invalidation for one event. Errors never propagate out of
    /// the listener; an invalidation failure is logged and the next event
    /// is processed.
    pub async fn handle_event(&self, event: &CollectorEvent) {
        let transaction_id = event.transaction_id();
        debug!(
            transaction_id = %transaction_id,
            event_type = event.event_type(),
            "Invalidating caches on lifecycle event"
        );

        match event {
            CollectorEvent::ExceptionStatusChanged { .. }
            | CollectorEvent::RetryAttemptStarted { .. }
            | CollectorEvent::RetryAttemptCompleted { .. } => {
                self.cache.invalidate(transaction_id).await;
            }
            CollectorEvent::ExceptionCaptured { .. } => {
                // A brand-new exception may overwrite a cached
                // "not found" verdict.
                self.cache.invalidate(transaction_id).await;
            }
        }
    }

    /// Spawn the background listener task.
    pub fn spawn(self, publisher: &EventPublisher) -> JoinHandle<()> {
        let mut receiver = publisher.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(published) => self.handle_event(&published.event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed events mean unknown transactions may be
                        // stale; flush everything rather than risk a
                        // false positive.
                        warn!(skipped, "Invalidation listener lagged, flushing all caches");
                        self.cache.clear_all();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
