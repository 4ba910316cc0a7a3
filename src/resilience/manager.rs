use super::circuit_breaker::CircuitBreaker;
use crate::config::CircuitBreakerSettings;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Lazily creates and hands out named circuit breakers sharing one
/// configuration. One instance per process, injected where needed.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    settings: CircuitBreakerSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerManager {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            settings,
            breakers: DashMap::new(),
        }
    }

    /// Get or create the breaker for a named component.
    pub fn get_circuit_breaker(&self, component: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(component.to_string())
            .or_insert_with(|| {
                debug!(component = %component, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(
                    component.to_string(),
                    self.settings.clone(),
                ))
            })
            .clone()
    }

    pub fn component_names(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }
}
