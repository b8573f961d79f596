//! System endpoints

use axum::Json;
use fleetinv_api::events::InventoryEvent;
use fleetinv_api::requests::{
    AddResourceRequest, AgentDiscoverRequest, AgentSyncRequest, ManualAddRequest,
    RegisterAgentRequest, ResourceIdsRequest, UpdateInventoryStatusRequest, UpdateVersionRequest,
};
use fleetinv_api::responses::{
    AgentSummary, HealthResponse, QueuedPlatform, ResourceSummary, StatusChangeResponse,
    UpdateVersionResponse,
};
use fleetinv_api::{
    AgentRef, FailedRoot, InventoryReport, InventoryReportResponse, InventoryStatus,
    MergeResourceResponse, ReportedResource, ResourceCategory, ResourceTypeRef,
    ResourceUpgradeRequest, ResourceUpgradeResponse, SyncType,
};
use utoipa::OpenApi;

use crate::api::error::ApiError;

/// Schema document for the daemon API
#[derive(OpenApi)]
#[openapi(
    info(title = "fleetinv", description = "Inventory reconciliation server"),
    components(schemas(
        ApiError,
        AddResourceRequest,
        AgentDiscoverRequest,
        AgentRef,
        AgentSummary,
        AgentSyncRequest,
        FailedRoot,
        HealthResponse,
        InventoryEvent,
        InventoryReport,
        InventoryReportResponse,
        InventoryStatus,
        ManualAddRequest,
        MergeResourceResponse,
        QueuedPlatform,
        RegisterAgentRequest,
        ReportedResource,
        ResourceCategory,
        ResourceIdsRequest,
        ResourceSummary,
        ResourceTypeRef,
        ResourceUpgradeRequest,
        ResourceUpgradeResponse,
        StatusChangeResponse,
        SyncType,
        UpdateInventoryStatusRequest,
        UpdateVersionRequest,
        UpdateVersionResponse,
    ))
)]
pub struct ApiDoc;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
