//! Server-side inventory model

use chrono::{DateTime, Utc};
use fleetinv_api::responses::ResourceSummary;
use fleetinv_api::{InventoryStatus, ResourceCategory, ResourceId, ResourceTypeRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog id of a resource type
pub type ResourceTypeId = u32;

/// Registry id of an agent
pub type AgentId = u32;

/// A resource type known to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    pub id: ResourceTypeId,
    pub name: String,
    pub plugin: String,
    pub category: ResourceCategory,
    /// Marked for deletion; reports using it are stale
    #[serde(default)]
    pub deleted: bool,
}

impl ResourceType {
    #[must_use]
    pub fn type_ref(&self) -> ResourceTypeRef {
        ResourceTypeRef::new(&self.name, &self.plugin)
    }
}

/// A registered agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    /// Callback address used to reach the agent
    pub address: String,
}

/// An inventoried resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Server-assigned id, `0` until inserted
    pub id: ResourceId,
    /// Agent-assigned identity
    pub uuid: Uuid,
    pub resource_key: String,
    pub name: String,
    pub resource_type: ResourceType,
    /// `None` for top-level platforms
    pub parent_id: Option<ResourceId>,
    /// Owning agent
    pub agent_id: Option<AgentId>,
    pub inventory_status: InventoryStatus,
    pub version: Option<String>,
    pub product_version_id: Option<u64>,
    pub description: Option<String>,
    pub plugin_configuration: serde_json::Value,
    /// Creation time
    pub ctime: DateTime<Utc>,
    /// Time of the last inventory status change
    pub itime: DateTime<Utc>,
    /// Modification time
    pub mtime: DateTime<Utc>,
    /// Creator/modifier identity
    pub modified_by: String,
}

impl Resource {
    #[must_use]
    pub fn category(&self) -> ResourceCategory {
        self.resource_type.category
    }

    /// Set a new status and stamp the status/modification times
    pub fn set_status(&mut self, status: InventoryStatus, now: DateTime<Utc>) {
        self.inventory_status = status;
        self.itime = now;
        self.mtime = now;
    }

    /// Queue view of the resource
    #[must_use]
    pub fn summary(&self, agent: Option<String>) -> ResourceSummary {
        ResourceSummary {
            id: self.id,
            name: self.name.clone(),
            resource_key: self.resource_key.clone(),
            type_name: self.resource_type.name.clone(),
            plugin: self.resource_type.plugin.clone(),
            category: self.category(),
            status: self.inventory_status,
            agent,
            ctime: self.ctime,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resource[id={}, key={}, name={}, type={}/{}, status={}]",
            self.id,
            self.resource_key,
            self.name,
            self.resource_type.name,
            self.resource_type.plugin,
            self.inventory_status
        )
    }
}
