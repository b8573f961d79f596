//! Request types for the API

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::inventory::{InventoryStatus, ReportedResource, ResourceId, ResourceTypeRef, SyncType};

/// Header carrying the operator identity recorded on status changes
pub const USER_HEADER: &str = "x-fleetinv-user";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateInventoryStatusRequest {
    #[serde(default)]
    pub platforms: Vec<ResourceId>,
    #[serde(default)]
    pub servers: Vec<ResourceId>,
    pub status: InventoryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResourceIdsRequest {
    pub resource_ids: Vec<ResourceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ManualAddRequest {
    pub resource_type: ResourceTypeRef,
    pub parent_id: ResourceId,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub plugin_configuration: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterAgentRequest {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateVersionRequest {
    pub version: String,
}

/// Server to agent: resynchronize a resource subtree
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentSyncRequest {
    pub resource_id: ResourceId,
    pub sync: Vec<SyncType>,
}

/// Server to agent: discover a resource the operator described
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentDiscoverRequest {
    pub resource_type: ResourceTypeRef,
    pub parent_id: ResourceId,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub plugin_configuration: serde_json::Value,
    /// Operator who asked for the resource
    pub creator: String,
}

/// Agent to server: a manually discovered resource
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddResourceRequest {
    pub resource: ReportedResource,
    pub creator: String,
}
