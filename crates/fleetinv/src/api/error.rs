//! API error types

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use fleetinv_api::requests::USER_HEADER;
use fleetinv_core::{CoreError, StoreError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl ApiError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Wrapper for API errors with status codes
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ApiError,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError::new(code, message),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let (status, code) = match &err {
            CoreError::InvalidReport { .. } => (StatusCode::BAD_REQUEST, "INVALID_REPORT"),
            CoreError::StaleType { .. } => (StatusCode::CONFLICT, "STALE_TYPE"),
            CoreError::ResourceNotFound(_) => (StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND"),
            CoreError::ParentNotCommitted { .. } => (StatusCode::CONFLICT, "PARENT_NOT_COMMITTED"),
            CoreError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            CoreError::InvalidStatusChange(_) => (StatusCode::BAD_REQUEST, "INVALID_STATUS_CHANGE"),
            CoreError::AgentNotFound(_) => (StatusCode::NOT_FOUND, "AGENT_NOT_FOUND"),
            CoreError::AgentAlreadyExists(_) => (StatusCode::CONFLICT, "AGENT_EXISTS"),
            CoreError::AgentError(_) => (StatusCode::BAD_GATEWAY, "AGENT_ERROR"),
            CoreError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            CoreError::ConfigError(_) => (StatusCode::BAD_REQUEST, "INVALID_CONFIG"),
            CoreError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "CONCURRENT_MODIFICATION"),
            CoreError::Store(StoreError::DuplicateKey { .. }) => (StatusCode::CONFLICT, "DUPLICATE_KEY"),
            CoreError::Collaborator(_) | CoreError::ActorError(_) | CoreError::Store(_) => {
                tracing::error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

/// Operator named in the request, `admin` when absent
pub fn operator(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("admin")
        .to_string()
}

#[cfg(test)]
mod tests {
    use fleetinv_api::InventoryStatus;

    use super::*;

    #[test]
    fn test_stale_type_maps_to_conflict() {
        let err = AppError::from(CoreError::StaleType {
            type_name: "Legacy".to_string(),
            plugin: "old".to_string(),
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.error.code, "STALE_TYPE");
    }

    #[test]
    fn test_transition_maps_to_conflict() {
        let err = AppError::from(CoreError::InvalidTransition {
            from: InventoryStatus::Committed,
            to: InventoryStatus::Ignored,
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert!(err.error.message.contains("COMMITTED"));
    }

    #[test]
    fn test_store_conflicts_map_to_conflict() {
        let err = AppError::from(CoreError::Store(StoreError::Conflict(7)));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.error.code, "CONCURRENT_MODIFICATION");

        let err = AppError::from(CoreError::Store(StoreError::DuplicateKey {
            parent: Some(1),
            key: "srv2".to_string(),
        }));
        assert_eq!(err.error.code, "DUPLICATE_KEY");
    }

    #[test]
    fn test_operator_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(operator(&headers), "admin");
        headers.insert(USER_HEADER, "rhqadmin".parse().unwrap());
        assert_eq!(operator(&headers), "rhqadmin");
    }
}
