//! Application state shared across HTTP handlers

use std::sync::Arc;

use fleetinv_core::{AgentRegistry, DiscoveryService};

use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Inventory engine
    pub service: Arc<DiscoveryService>,
    /// Agent registry handle
    pub registry: AgentRegistry,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state
    pub fn new(service: Arc<DiscoveryService>, registry: AgentRegistry, config: Config) -> Self {
        Self {
            service,
            registry,
            config: Arc::new(config),
        }
    }
}
