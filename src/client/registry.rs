use super::traits::SourceServiceClient;
use crate::models::InterfaceType;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Selects the source-service client for an interface type.
#[derive(Default)]
pub struct SourceClientRegistry {
    clients: DashMap<InterfaceType, Arc<dyn SourceServiceClient>>,
}

impl SourceClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: Arc<dyn SourceServiceClient>) {
        let interface_type = client.interface_type();
        info!(interface_type = %interface_type, "Registered source service client");
        self.clients.insert(interface_type, client);
    }

    pub fn get(&self, interface_type: InterfaceType) -> Option<Arc<dyn SourceServiceClient>> {
        self.clients.get(&interface_type).map(|c| c.clone())
    }

    pub fn registered_types(&self) -> Vec<InterfaceType> {
        self.clients.iter().map(|e| *e.key()).collect()
    }
}
