//! Persistence boundary for the inventory graph
//!
//! All reads and writes of a merge go through an [`InventoryTx`]. Dropping a
//! transaction without calling [`InventoryTx::commit`] discards its writes.

mod memory;

pub use memory::InMemoryInventory;

use async_trait::async_trait;
use fleetinv_api::{InventoryStatus, ResourceCategory, ResourceId};

use crate::error::StoreError;
use crate::model::{AgentId, Resource};

/// Source of inventory transactions
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Open a new unit of work
    async fn begin(&self) -> Result<Box<dyn InventoryTx>, StoreError>;
}

/// A unit of work against the inventory graph
#[async_trait]
pub trait InventoryTx: Send {
    /// Find a resource by server id; `None` is not an error
    async fn find(&mut self, id: ResourceId) -> Result<Option<Resource>, StoreError>;

    /// Find a resource by its business key under a parent
    async fn find_by_business_key(
        &mut self,
        parent: Option<ResourceId>,
        resource_key: &str,
        type_name: &str,
        plugin: &str,
    ) -> Result<Option<Resource>, StoreError>;

    /// Direct children of a resource
    async fn children(&mut self, id: ResourceId) -> Result<Vec<Resource>, StoreError>;

    /// Persist a new resource and return its assigned id
    async fn insert(&mut self, resource: Resource) -> Result<ResourceId, StoreError>;

    /// Overwrite an existing resource
    async fn update(&mut self, resource: &Resource) -> Result<(), StoreError>;

    /// The top-level platform owned by an agent
    async fn platform_for_agent(&mut self, agent: AgentId) -> Result<Option<Resource>, StoreError>;

    /// Resources in any of the given statuses, optionally of one category
    async fn find_by_status(
        &mut self,
        category: Option<ResourceCategory>,
        statuses: &[InventoryStatus],
    ) -> Result<Vec<Resource>, StoreError>;

    /// Make every write of this unit of work visible
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
