//! fleetinv-api: Shared API types and schemas
//!
//! Contains the inventory wire model exchanged with agents, request/response
//! bodies for the daemon's HTTP API, and broadcast event types.

pub mod events;
pub mod inventory;
pub mod requests;
pub mod responses;

pub use inventory::{
    AgentRef, FailedRoot, InventoryReport, InventoryReportResponse, InventoryStatus,
    MergeResourceResponse, ROOT_ID, ReportedResource, ResourceCategory, ResourceId,
    ResourceTypeRef, ResourceUpgradeRequest, ResourceUpgradeResponse, SyncSet, SyncType,
};
