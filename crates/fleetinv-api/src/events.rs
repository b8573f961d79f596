//! Broadcast event types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::inventory::{InventoryStatus, ResourceId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum InventoryEvent {
    ReportMerged {
        agent: String,
        merged: usize,
        failed_roots: usize,
        elapsed_ms: u64,
    },
    ResourceAdded {
        resource_id: ResourceId,
        name: String,
        status: InventoryStatus,
    },
    StatusChanged {
        resource_id: ResourceId,
        from: InventoryStatus,
        to: InventoryStatus,
    },
    ResourceRevived {
        resource_id: ResourceId,
        name: String,
    },
    AgentRegistered {
        agent: String,
    },
    AgentSyncFailed {
        agent: String,
        resource_id: ResourceId,
        error: String,
    },
}
