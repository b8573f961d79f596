//! Inventory wire model exchanged between agents and the server

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Server-assigned resource id (`0` until first persisted)
pub type ResourceId = u64;

/// Id used by agents for "no server id yet" and for "no parent"
pub const ROOT_ID: ResourceId = 0;

// ============================================================================
// Enumerations
// ============================================================================

/// Inventory lifecycle status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryStatus {
    /// Discovered, waiting in the discovery queue
    #[default]
    New,
    /// Explicitly ignored by an operator
    Ignored,
    /// Imported into the managed inventory
    Committed,
    /// Logically deleted (reversible)
    Deleted,
    /// Marked for purge (terminal)
    Uninventoried,
}

impl std::fmt::Display for InventoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InventoryStatus::New => write!(f, "NEW"),
            InventoryStatus::Ignored => write!(f, "IGNORED"),
            InventoryStatus::Committed => write!(f, "COMMITTED"),
            InventoryStatus::Deleted => write!(f, "DELETED"),
            InventoryStatus::Uninventoried => write!(f, "UNINVENTORIED"),
        }
    }
}

impl std::str::FromStr for InventoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(InventoryStatus::New),
            "IGNORED" => Ok(InventoryStatus::Ignored),
            "COMMITTED" => Ok(InventoryStatus::Committed),
            "DELETED" => Ok(InventoryStatus::Deleted),
            "UNINVENTORIED" => Ok(InventoryStatus::Uninventoried),
            other => Err(format!("unknown inventory status '{other}'")),
        }
    }
}

/// Category of a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceCategory {
    Platform,
    Server,
    Service,
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceCategory::Platform => write!(f, "PLATFORM"),
            ResourceCategory::Server => write!(f, "SERVER"),
            ResourceCategory::Service => write!(f, "SERVICE"),
        }
    }
}

/// What an agent should re-synchronize after a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncType {
    Status,
    MeasurementSchedules,
}

// ============================================================================
// Reports
// ============================================================================

/// Reference to a resource type as known by the agent
///
/// Never trusted as given: the server resolves it against its own catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct ResourceTypeRef {
    /// Type name
    pub name: String,
    /// Defining plugin
    pub plugin: String,
}

impl ResourceTypeRef {
    pub fn new(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
        }
    }
}

impl std::fmt::Display for ResourceTypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.plugin)
    }
}

/// A resource as reported by an agent, with its reported subtree
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportedResource {
    /// Server id the agent remembers (`0` if none)
    #[serde(default)]
    pub id: ResourceId,
    /// Agent-assigned identity, stable for the resource's lifetime
    pub uuid: Uuid,
    /// Business key, unique among same-typed siblings
    pub resource_key: Option<String>,
    /// Display name
    pub name: String,
    /// Reported type
    pub resource_type: Option<ResourceTypeRef>,
    /// Parent the agent claims already exists server-side (roots only)
    #[serde(default)]
    pub parent_id: ResourceId,
    /// The agent's local view of the status; never applied by the server
    #[serde(default)]
    pub inventory_status: InventoryStatus,
    /// Product version string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque plugin configuration
    #[serde(default)]
    #[schema(value_type = Object)]
    pub plugin_configuration: serde_json::Value,
    /// Reported children
    #[serde(default)]
    #[schema(no_recursion)]
    pub children: Vec<ReportedResource>,
}

impl ReportedResource {
    /// Create a reported resource with a fresh UUID and no server id
    pub fn new(
        resource_key: impl Into<String>,
        name: impl Into<String>,
        resource_type: ResourceTypeRef,
    ) -> Self {
        Self {
            id: ROOT_ID,
            uuid: Uuid::new_v4(),
            resource_key: Some(resource_key.into()),
            name: name.into(),
            resource_type: Some(resource_type),
            parent_id: ROOT_ID,
            inventory_status: InventoryStatus::New,
            version: None,
            description: None,
            plugin_configuration: serde_json::Value::Null,
            children: Vec::new(),
        }
    }

    /// Add a child resource
    #[must_use]
    pub fn with_child(mut self, child: ReportedResource) -> Self {
        self.children.push(child);
        self
    }

    /// Set the version string
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the server id the agent believes this resource has
    #[must_use]
    pub fn with_id(mut self, id: ResourceId) -> Self {
        self.id = id;
        self
    }

    /// Attach to a parent the agent believes already exists server-side
    #[must_use]
    pub fn with_parent(mut self, parent_id: ResourceId) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Number of resources in this subtree, including this one
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

impl std::fmt::Display for ReportedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resource[id={}, uuid={}, key={}, name={}",
            self.id,
            self.uuid,
            self.resource_key.as_deref().unwrap_or("<none>"),
            self.name
        )?;
        match &self.resource_type {
            Some(t) => write!(f, ", type={t}]"),
            None => write!(f, ", type=<none>]"),
        }
    }
}

/// Reporting agent identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentRef {
    /// Agent name, as registered with the server
    pub name: String,
}

/// One agent's inventory snapshot
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryReport {
    /// Reporting agent
    pub agent: AgentRef,
    /// Root resources (top-level platforms, or resources whose parent already exists)
    pub roots: Vec<ReportedResource>,
    /// When the agent produced the report
    #[serde(default = "Utc::now")]
    pub reported_at: DateTime<Utc>,
}

impl InventoryReport {
    /// Create a report for the named agent
    pub fn new(agent: impl Into<String>, roots: Vec<ReportedResource>) -> Self {
        Self {
            agent: AgentRef { name: agent.into() },
            roots,
            reported_at: Utc::now(),
        }
    }

    /// Total number of reported resources across all roots
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.roots.iter().map(ReportedResource::subtree_len).sum()
    }
}

/// A root that could not be merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FailedRoot {
    /// UUID of the reported root
    pub uuid: Uuid,
    /// Name of the reported root
    pub name: String,
    /// Why the root was not merged
    pub reason: String,
}

/// Acknowledgement of an inventory report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InventoryReportResponse {
    /// Reported UUID to resolved server id, for every merged resource
    #[schema(value_type = Object)]
    pub mappings: BTreeMap<Uuid, ResourceId>,
    /// Roots that failed to merge; every other root is committed
    #[serde(default)]
    pub failed_roots: Vec<FailedRoot>,
    /// The agent's platform after the merge, if it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<ResourceId>,
}

impl InventoryReportResponse {
    /// Resolved server id for a reported UUID
    #[must_use]
    pub fn id_for(&self, uuid: &Uuid) -> Option<ResourceId> {
        self.mappings.get(uuid).copied()
    }

    /// Whether every root in the report was merged
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_roots.is_empty()
    }
}

/// Result of adding a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MergeResourceResponse {
    /// Server id of the resource
    pub resource_id: ResourceId,
    /// Whether the resource was already in inventory
    pub already_existed: bool,
}

/// The set of sync kinds requested from an agent
pub type SyncSet = BTreeSet<SyncType>;

// ============================================================================
// Upgrades
// ============================================================================

/// Agent-side upgrade of an existing resource's identity fields
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResourceUpgradeRequest {
    /// Server id of the resource being upgraded
    pub resource_id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_resource_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_description: Option<String>,
    /// Set when the agent failed to upgrade the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_error: Option<String>,
}

/// What the server accepted from an upgrade request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResourceUpgradeResponse {
    pub resource_id: ResourceId,
    pub resource_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
