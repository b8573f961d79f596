//! fleetinv-core: Inventory reconciliation engine
//!
//! Merges the resource trees reported by agents into the authoritative
//! inventory graph, governs inventory status changes and keeps agents in
//! sync through per-agent kameo actors.

pub mod actor;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod groups;
pub mod identity;
pub mod merge;
pub mod message;
pub mod model;
pub mod post_merge;
pub mod serializer;
pub mod status;
pub mod store;
pub mod sync;
pub mod traits;

pub use actor::{AgentActor, AgentRegistry, AgentRegistryActor, AgentRegistryActorArgs};
pub use catalog::InMemoryTypeCatalog;
pub use config::{AgentConfig, InventoryConfig, ResourceTypeConfig};
pub use discovery::{DiscoveryService, DiscoveryServiceArgs};
pub use error::{CoreError, StoreError, ValidationRule};
pub use groups::CompatibleGroups;
pub use model::{Agent, AgentId, Resource, ResourceType, ResourceTypeId};
pub use store::{InMemoryInventory, InventoryStore, InventoryTx};
pub use sync::{SyncReport, SyncTarget};
pub use traits::{
    AgentClient, AgentClientFactory, AgentDirectory, AlertTemplates, GroupMembership,
    ProductVersions, ResourceTypeCatalog,
};
