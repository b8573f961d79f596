//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use chrono::{DateTime, Utc};
use fleetinv_api::responses::AgentSummary;
use fleetinv_api::{ResourceId, ResourceTypeRef, SyncSet};
use kameo_macros::Reply;

use crate::config::AgentConfig;
use crate::model::AgentId;

// ============================================================================
// AgentActor Messages
// ============================================================================

/// Ask the agent to resynchronize a resource subtree
#[derive(Debug)]
pub struct Synchronize {
    /// Root of the subtree to resynchronize
    pub resource_id: ResourceId,
    /// What to resynchronize
    pub sync: SyncSet,
}

/// Ask the agent to discover a resource described by an operator
#[derive(Debug)]
pub struct ManuallyAdd {
    pub resource_type: ResourceTypeRef,
    pub parent_id: ResourceId,
    pub plugin_configuration: serde_json::Value,
    /// Operator requesting the addition
    pub creator: String,
}

/// Get agent connection status
#[derive(Debug)]
pub struct GetAgentStatus;

/// Agent connection status
#[derive(Debug, Clone, Reply)]
pub struct AgentStatus {
    pub id: AgentId,
    pub name: String,
    pub address: String,
    /// Last successful synchronization
    pub last_sync: Option<DateTime<Utc>>,
    /// Failed synchronizations since the last success
    pub sync_failures: u32,
}

impl From<AgentStatus> for AgentSummary {
    fn from(status: AgentStatus) -> Self {
        Self {
            name: status.name,
            address: status.address,
            last_sync: status.last_sync,
            sync_failures: status.sync_failures,
        }
    }
}

// ============================================================================
// AgentRegistryActor Messages
// ============================================================================

/// Register a new agent
#[derive(Debug)]
pub struct RegisterAgent {
    pub config: AgentConfig,
}

/// Unregister an agent
#[derive(Debug)]
pub struct UnregisterAgent {
    pub name: String,
}

/// Find an agent by name
#[derive(Debug)]
pub struct LookupAgent {
    pub name: String,
}

/// Find an agent by id
#[derive(Debug)]
pub struct LookupAgentById {
    pub id: AgentId,
}

/// Get the actor handling an agent
#[derive(Debug)]
pub struct GetAgentRef {
    pub id: AgentId,
}

/// List all registered agents
#[derive(Debug)]
pub struct ListAgents;
