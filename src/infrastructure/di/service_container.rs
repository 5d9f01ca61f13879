//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::config::{expand_env_vars, Settings};
use crate::application::services::{IntegrityService, OrderService, RenameService, RepairService};
use crate::infrastructure::traits::{GraphStore, JsonFileGraphStore};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Graph store shared by all services
    pub store: Arc<dyn GraphStore>,

    pub integrity: IntegrityService,
    pub repair: RepairService,
    pub rename: RenameService,
    pub orders: OrderService,
}

impl ServiceContainer {
    /// Create a new service container backed by the configured JSON file.
    pub fn new(settings: Settings) -> Self {
        let path = expand_env_vars(&settings.store_path.to_string_lossy());
        let store: Arc<dyn GraphStore> = Arc::new(JsonFileGraphStore::new(path));
        Self::with_store(settings, store)
    }

    /// Create a service container over a custom store (for testing).
    pub fn with_store(settings: Settings, store: Arc<dyn GraphStore>) -> Self {
        let settings = Arc::new(settings);

        Self {
            integrity: IntegrityService::new(Arc::clone(&store), Arc::clone(&settings)),
            repair: RepairService::new(Arc::clone(&store)),
            rename: RenameService::new(Arc::clone(&store)),
            orders: OrderService::new(Arc::clone(&store), Arc::clone(&settings)),
            settings,
            store,
        }
    }
}
