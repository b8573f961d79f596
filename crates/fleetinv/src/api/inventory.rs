//! Agent-facing inventory endpoints

use std::sync::Arc;

use axum::{Json, extract::State};
use fleetinv_api::{
    InventoryReport, InventoryReportResponse, MergeResourceResponse, ResourceUpgradeRequest,
    ResourceUpgradeResponse, requests::AddResourceRequest,
};

use crate::api::error::AppError;
use crate::state::AppState;

/// Merge an agent's inventory report
///
/// # Errors
/// Returns `AppError` for invalid reports, unknown agents and stale types
pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    Json(report): Json<InventoryReport>,
) -> Result<Json<InventoryReportResponse>, AppError> {
    let response = state.service.merge_inventory_report(report).await?;
    Ok(Json(response))
}

/// Accept a manually discovered resource from an agent
///
/// # Errors
/// Returns `AppError` if the resource is invalid or its parent is unknown
pub async fn add_resource(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddResourceRequest>,
) -> Result<Json<MergeResourceResponse>, AppError> {
    let response = state.service.add_resource(req.resource, &req.creator).await?;
    Ok(Json(response))
}

/// Apply agent-side resource upgrades
///
/// # Errors
/// Returns `AppError` if persistence fails
pub async fn upgrade_resources(
    State(state): State<Arc<AppState>>,
    Json(requests): Json<Vec<ResourceUpgradeRequest>>,
) -> Result<Json<Vec<ResourceUpgradeResponse>>, AppError> {
    let responses = state.service.upgrade_resources(requests).await?;
    Ok(Json(responses))
}
