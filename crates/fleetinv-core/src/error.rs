//! Core error types for fleetinv-core

use fleetinv_api::{InventoryStatus, ResourceId};
use thiserror::Error;

/// Structural rule an inventory report violated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    /// A reported resource has no type
    MissingType,
    /// A reported resource has no resource key
    MissingKey,
    /// A reported resource asserts `DELETED` status
    DeletedStatus,
    /// The reporting agent is not registered
    UnknownAgent,
    /// Two reported resources share a uuid
    DuplicateUuid,
}

impl std::fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationRule::MissingType => write!(f, "resource has a null type"),
            ValidationRule::MissingKey => write!(f, "resource has a null key"),
            ValidationRule::DeletedStatus => write!(
                f,
                "illegal inventory status DELETED, agents are not allowed to delete resources"
            ),
            ValidationRule::UnknownAgent => write!(f, "unknown agent"),
            ValidationRule::DuplicateUuid => write!(f, "uuid reported more than once"),
        }
    }
}

/// Errors raised by the persistence boundary
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Record referenced by an update does not exist
    #[error("resource {0} does not exist")]
    Missing(ResourceId),

    /// Another record already holds the business key
    #[error("duplicate resource key '{key}' under parent {parent:?}")]
    DuplicateKey {
        /// Parent of the conflicting record
        parent: Option<ResourceId>,
        /// Conflicting key
        key: String,
    },

    /// Record changed since this unit of work first read it
    #[error("resource {0} was modified concurrently")]
    Conflict(ResourceId),

    /// Backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors that can occur in inventory operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Report failed structural validation; nothing was persisted
    #[error("invalid inventory report: {rule} [{resource}]")]
    InvalidReport {
        /// Violated rule
        rule: ValidationRule,
        /// Offending resource (or agent name)
        resource: String,
    },

    /// Report references a type the server no longer knows
    #[error("stale resource type {type_name}/{plugin}, agent plugin metadata must be refreshed")]
    StaleType {
        /// Type name
        type_name: String,
        /// Defining plugin
        plugin: String,
    },

    /// Resource not found in inventory
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),

    /// Parent of a resource must be committed first
    #[error("cannot commit resource {resource}, its parent {parent} has not been committed")]
    ParentNotCommitted {
        /// Resource being committed
        resource: ResourceId,
        /// Uncommitted parent
        parent: ResourceId,
    },

    /// Invalid inventory status transition
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: InventoryStatus,
        /// Attempted target status
        to: InventoryStatus,
    },

    /// Operator status change request rejected
    #[error("invalid status change: {0}")]
    InvalidStatusChange(String),

    /// Agent not found in registry
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// Agent already exists in registry
    #[error("agent already exists: {0}")]
    AgentAlreadyExists(String),

    /// Agent call failed
    #[error("agent communication failed: {0}")]
    AgentError(String),

    /// Agent call timed out
    #[error("operation timeout")]
    Timeout,

    /// Best-effort collaborator failed
    #[error("collaborator failed: {0}")]
    Collaborator(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub(crate) fn invalid(rule: ValidationRule, resource: impl std::fmt::Display) -> Self {
        CoreError::InvalidReport {
            rule,
            resource: resource.to_string(),
        }
    }

    /// Check if the report was rejected for structural reasons
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::InvalidReport { .. })
    }

    /// Check if the agent must refresh its plugin metadata
    #[must_use]
    pub fn is_stale_type(&self) -> bool {
        matches!(self, CoreError::StaleType { .. })
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::AgentError(_)
                | CoreError::Timeout
                | CoreError::Store(StoreError::Backend(_) | StoreError::Conflict(_))
        )
    }
}
