//! Response types for the API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::inventory::{InventoryStatus, ResourceCategory, ResourceId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Resource summary as shown in the discovery queue
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResourceSummary {
    pub id: ResourceId,
    pub name: String,
    pub resource_key: String,
    pub type_name: String,
    pub plugin: String,
    pub category: ResourceCategory,
    pub status: InventoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub ctime: DateTime<Utc>,
}

/// A queued platform with its queued child servers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueuedPlatform {
    pub platform: ResourceSummary,
    pub servers: Vec<ResourceSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentSummary {
    pub name: String,
    pub address: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateVersionResponse {
    pub found: bool,
}

/// Outcome of an inventory status change
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeResponse {
    /// Agent synchronizations requested
    pub dispatched: usize,
    /// Synchronizations that failed; the status change itself stands
    pub failed: usize,
}
