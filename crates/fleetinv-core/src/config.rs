//! Configuration types for the inventory engine and its collaborators

use std::time::Duration;

use fleetinv_api::ResourceCategory;
use serde::{Deserialize, Serialize};

/// Engine-wide inventory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Identity recorded as creator/modifier of auto-discovered resources
    #[serde(default = "default_system_user")]
    pub system_user: String,
    /// Upper bound on a single agent call, in seconds
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,
    /// Whether agent upgrades may rename resources and rewrite descriptions
    #[serde(default)]
    pub allow_generic_properties_upgrade: bool,
    /// Capacity of the inventory event broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_system_user() -> String {
    "system".to_string()
}

fn default_sync_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            system_user: default_system_user(),
            sync_timeout_secs: default_sync_timeout_secs(),
            allow_generic_properties_upgrade: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl InventoryConfig {
    #[must_use]
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}

/// An agent known to the server at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent name
    pub name: String,
    /// Base URL the server uses to reach the agent
    pub address: String,
}

/// Static resource type seed for the in-memory catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTypeConfig {
    pub name: String,
    pub plugin: String,
    pub category: ResourceCategory,
    /// Marked for deletion
    #[serde(default)]
    pub deleted: bool,
    /// Alert template names applied to committed resources of this type
    #[serde(default)]
    pub alert_templates: Vec<String>,
}
