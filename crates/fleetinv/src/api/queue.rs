//! Discovery queue endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use fleetinv_api::{
    InventoryStatus,
    requests::{ResourceIdsRequest, UpdateInventoryStatusRequest},
    responses::{QueuedPlatform, StatusChangeResponse},
};
use serde::Deserialize;

use crate::api::error::{AppError, operator};
use crate::state::AppState;

/// Query parameters for the queue listing
#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    /// Comma-separated statuses, `NEW` when absent
    pub status: Option<String>,
}

impl QueueQuery {
    fn statuses(&self) -> Result<Vec<InventoryStatus>, AppError> {
        let Some(raw) = self.status.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(vec![InventoryStatus::New]);
        };

        raw.split(',')
            .map(|s| s.parse().map_err(AppError::bad_request))
            .collect()
    }
}

/// List queued platforms with their queued servers
///
/// # Errors
/// Returns `AppError` for unknown statuses or persistence failures
pub async fn list_queue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<QueuedPlatform>>, AppError> {
    let statuses = query.statuses()?;
    let queue = state.service.queued_platforms_and_servers(&statuses).await?;
    Ok(Json(queue))
}

/// Change the inventory status of platforms and servers
///
/// # Errors
/// Returns `AppError` if the change violates the status rules
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UpdateInventoryStatusRequest>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    let user = operator(&headers);
    let report = state
        .service
        .update_inventory_status(&user, &req.platforms, &req.servers, req.status)
        .await?;
    Ok(Json(report.into()))
}

/// Commit `NEW` resources
///
/// # Errors
/// Returns `AppError` if a resource is not `NEW` or is a service
pub async fn import(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ResourceIdsRequest>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    let user = operator(&headers);
    let report = state.service.import_resources(&user, &req.resource_ids).await?;
    Ok(Json(report.into()))
}

/// Ignore `NEW` resources
///
/// # Errors
/// Returns `AppError` if a resource is not `NEW` or is a service
pub async fn ignore(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ResourceIdsRequest>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    let user = operator(&headers);
    let report = state.service.ignore_resources(&user, &req.resource_ids).await?;
    Ok(Json(report.into()))
}

/// Return `IGNORED` resources to the queue
///
/// # Errors
/// Returns `AppError` if a resource is not `IGNORED` or is a service
pub async fn unignore(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ResourceIdsRequest>,
) -> Result<Json<StatusChangeResponse>, AppError> {
    let user = operator(&headers);
    let report = state.service.unignore_resources(&user, &req.resource_ids).await?;
    Ok(Json(report.into()))
}
