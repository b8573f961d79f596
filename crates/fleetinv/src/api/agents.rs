//! Agent registry endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use fleetinv_api::{requests::RegisterAgentRequest, responses::AgentSummary};
use fleetinv_core::AgentConfig;

use crate::api::error::AppError;
use crate::state::AppState;

/// List registered agents
///
/// # Errors
/// Returns `AppError` if the registry cannot be reached
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Result<Json<Vec<AgentSummary>>, AppError> {
    let agents = state.registry.list().await?;
    Ok(Json(agents.into_iter().map(AgentSummary::from).collect()))
}

/// Register an agent
///
/// # Errors
/// Returns `AppError` if the name is taken or empty
pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let agent = state
        .registry
        .register(AgentConfig {
            name: req.name,
            address: req.address,
        })
        .await?;

    let summary = AgentSummary {
        name: agent.name,
        address: agent.address,
        last_sync: None,
        sync_failures: 0,
    };
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Unregister an agent
///
/// # Errors
/// Returns `AppError` if the agent is unknown
pub async fn unregister_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.registry.unregister(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
