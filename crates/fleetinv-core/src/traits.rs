//! Boundaries to the collaborators the inventory engine depends on

use std::sync::Arc;

use async_trait::async_trait;
use fleetinv_api::{MergeResourceResponse, ResourceId, ResourceTypeRef, SyncSet};

use crate::error::CoreError;
use crate::model::{Agent, AgentId, Resource, ResourceType, ResourceTypeId};

/// Read-only lookup of the resource types the server knows
#[async_trait]
pub trait ResourceTypeCatalog: Send + Sync {
    /// Find a type by name and defining plugin
    async fn lookup(&self, name: &str, plugin: &str) -> Option<ResourceType>;
}

/// Entry point of the alerting subsystem
#[async_trait]
pub trait AlertTemplates: Send + Sync {
    /// Instantiate the type's alert templates as definitions for one resource
    async fn instantiate_for(&self, resource_id: ResourceId, type_id: ResourceTypeId) -> Result<usize, String>;
}

/// Product version records
#[async_trait]
pub trait ProductVersions: Send + Sync {
    /// Create or find the product version record for a type and version string
    async fn add_product_version(&self, resource_type: &ResourceType, version: &str) -> Result<u64, String>;
}

/// Implicit (compatible) group membership
#[async_trait]
pub trait GroupMembership: Send + Sync {
    /// Recalculate which implicit groups the resource belongs to
    async fn update_implicit_membership(&self, resource: &Resource) -> Result<(), String>;
}

/// Outbound transport to a single agent
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Ask the agent to resynchronize its view of a resource subtree
    async fn synchronize_inventory(&self, resource_id: ResourceId, sync: &SyncSet) -> Result<(), String>;

    /// Ask the agent to discover a resource the operator described
    ///
    /// The agent reports the resource back through `add_resource` before replying.
    async fn manually_add_resource(
        &self,
        resource_type: &ResourceTypeRef,
        parent_id: ResourceId,
        plugin_configuration: &serde_json::Value,
        creator: &str,
    ) -> Result<MergeResourceResponse, String>;
}

/// Creates the transport for a newly registered agent
#[async_trait]
pub trait AgentClientFactory: Send + Sync {
    async fn create_client(&self, agent: &Agent) -> Arc<dyn AgentClient>;
}

/// Registered agents, as seen by the engine
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Find a registered agent by name
    async fn find_by_name(&self, name: &str) -> Result<Option<Agent>, CoreError>;

    /// Find a registered agent by id
    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, CoreError>;

    /// Ask the agent to resynchronize a resource subtree
    async fn synchronize_inventory(
        &self,
        agent: AgentId,
        resource_id: ResourceId,
        sync: SyncSet,
    ) -> Result<(), CoreError>;

    /// Ask the agent to discover and report a resource
    async fn manually_add_resource(
        &self,
        agent: AgentId,
        resource_type: ResourceTypeRef,
        parent_id: ResourceId,
        plugin_configuration: serde_json::Value,
        creator: String,
    ) -> Result<MergeResourceResponse, CoreError>;
}
