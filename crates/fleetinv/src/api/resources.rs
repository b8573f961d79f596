//! Resource endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use fleetinv_api::{
    MergeResourceResponse, ResourceId,
    requests::{ManualAddRequest, UpdateVersionRequest},
    responses::{ResourceSummary, UpdateVersionResponse},
};

use crate::api::error::{AppError, operator};
use crate::state::AppState;

/// Get a single resource
///
/// # Errors
/// Returns `AppError` if the resource does not exist
pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ResourceId>,
) -> Result<Json<ResourceSummary>, AppError> {
    Ok(Json(state.service.resource(id).await?))
}

/// Record a resource's new version
///
/// # Errors
/// Returns `AppError` if persistence fails
pub async fn update_version(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ResourceId>,
    Json(req): Json<UpdateVersionRequest>,
) -> Result<Json<UpdateVersionResponse>, AppError> {
    let found = state.service.update_resource_version(id, &req.version).await?;
    Ok(Json(UpdateVersionResponse { found }))
}

/// Ask the parent's agent to discover a resource
///
/// # Errors
/// Returns `AppError` for unknown types or parents, and agent failures
pub async fn manually_add(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ManualAddRequest>,
) -> Result<Json<MergeResourceResponse>, AppError> {
    let user = operator(&headers);
    let response = state
        .service
        .manually_add_resource(&user, req.resource_type, req.parent_id, req.plugin_configuration)
        .await?;
    Ok(Json(response))
}
