//! In-memory inventory store
//!
//! Transactions stage their writes in a private overlay and apply them under
//! the write lock on commit. Every committed row carries a revision; a
//! transaction remembers the revision it first saw and refuses to commit over
//! a row another transaction changed in the meantime.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use fleetinv_api::{InventoryStatus, ResourceCategory, ResourceId};
use tokio::sync::RwLock;
use tracing::debug;

use super::{InventoryStore, InventoryTx};
use crate::error::StoreError;
use crate::model::{AgentId, Resource, ResourceType, ResourceTypeId};
use crate::traits::ProductVersions;

#[derive(Debug, Default)]
struct State {
    resources: HashMap<ResourceId, Resource>,
    revisions: HashMap<ResourceId, u64>,
    children: HashMap<Option<ResourceId>, BTreeSet<ResourceId>>,
    product_versions: HashMap<(ResourceTypeId, String), u64>,
}

/// Inventory graph held in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<State>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryInventory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed view of a resource
    pub async fn get(&self, id: ResourceId) -> Option<Resource> {
        self.state.read().await.resources.get(&id).cloned()
    }

    /// Number of committed resources
    pub async fn len(&self) -> usize {
        self.state.read().await.resources.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every committed resource, ordered by id
    pub async fn snapshot(&self) -> Vec<Resource> {
        let state = self.state.read().await;
        let mut resources: Vec<_> = state.resources.values().cloned().collect();
        resources.sort_by_key(|r| r.id);
        resources
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn begin(&self) -> Result<Box<dyn InventoryTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            state: Arc::clone(&self.state),
            next_id: Arc::clone(&self.next_id),
            staged: HashMap::new(),
            inserted: Vec::new(),
            base: HashMap::new(),
        }))
    }
}

#[async_trait]
impl ProductVersions for InMemoryInventory {
    async fn add_product_version(&self, resource_type: &ResourceType, version: &str) -> Result<u64, String> {
        let mut state = self.state.write().await;
        let next = state.product_versions.len() as u64 + 1;
        let id = *state
            .product_versions
            .entry((resource_type.id, version.to_string()))
            .or_insert(next);
        Ok(id)
    }
}

struct MemoryTx {
    state: Arc<RwLock<State>>,
    next_id: Arc<AtomicU64>,
    staged: HashMap<ResourceId, Resource>,
    inserted: Vec<ResourceId>,
    /// Revision of each committed row when this transaction first read it
    base: HashMap<ResourceId, u64>,
}

impl MemoryTx {
    fn view<'a>(&'a self, state: &'a State, id: ResourceId) -> Option<&'a Resource> {
        self.staged.get(&id).or_else(|| state.resources.get(&id))
    }

    fn all<'a>(&'a self, state: &'a State) -> impl Iterator<Item = &'a Resource> {
        state
            .resources
            .values()
            .filter(|r| !self.staged.contains_key(&r.id))
            .chain(self.staged.values())
    }

    fn children_of<'a>(&'a self, state: &'a State, parent: Option<ResourceId>) -> Vec<&'a Resource> {
        let mut ids = state.children.get(&parent).cloned().unwrap_or_default();
        ids.extend(
            self.staged
                .values()
                .filter(|r| r.parent_id == parent)
                .map(|r| r.id),
        );

        ids.into_iter()
            .filter_map(|id| self.view(state, id))
            .filter(|r| r.parent_id == parent)
            .collect()
    }

    fn observe(&mut self, state: &State, ids: impl IntoIterator<Item = ResourceId>) {
        for id in ids {
            if let Some(revision) = state.revisions.get(&id) {
                self.base.entry(id).or_insert(*revision);
            }
        }
    }

    fn find_key<'a>(
        &'a self,
        state: &'a State,
        parent: Option<ResourceId>,
        resource_key: &str,
        type_name: &str,
        plugin: &str,
    ) -> Option<&'a Resource> {
        self.children_of(state, parent).into_iter().find(|r| {
            r.resource_key == resource_key
                && r.resource_type.name == type_name
                && r.resource_type.plugin == plugin
        })
    }
}

fn same_key(a: &Resource, b: &Resource) -> bool {
    a.id != b.id
        && a.parent_id == b.parent_id
        && a.resource_key == b.resource_key
        && a.resource_type.name == b.resource_type.name
        && a.resource_type.plugin == b.resource_type.plugin
}

#[async_trait]
impl InventoryTx for MemoryTx {
    async fn find(&mut self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        let shared = Arc::clone(&self.state);
        let state = shared.read().await;
        let found = self.view(&state, id).cloned();
        self.observe(&state, found.iter().map(|r| r.id));
        Ok(found)
    }

    async fn find_by_business_key(
        &mut self,
        parent: Option<ResourceId>,
        resource_key: &str,
        type_name: &str,
        plugin: &str,
    ) -> Result<Option<Resource>, StoreError> {
        let shared = Arc::clone(&self.state);
        let state = shared.read().await;
        let found = self
            .find_key(&state, parent, resource_key, type_name, plugin)
            .cloned();
        self.observe(&state, found.iter().map(|r| r.id));
        Ok(found)
    }

    async fn children(&mut self, id: ResourceId) -> Result<Vec<Resource>, StoreError> {
        let shared = Arc::clone(&self.state);
        let state = shared.read().await;
        let mut children: Vec<_> = self
            .children_of(&state, Some(id))
            .into_iter()
            .cloned()
            .collect();
        children.sort_by_key(|r| r.id);
        self.observe(&state, children.iter().map(|r| r.id));
        Ok(children)
    }

    async fn insert(&mut self, mut resource: Resource) -> Result<ResourceId, StoreError> {
        {
            let state = self.state.read().await;
            if self
                .find_key(
                    &state,
                    resource.parent_id,
                    &resource.resource_key,
                    &resource.resource_type.name,
                    &resource.resource_type.plugin,
                )
                .is_some()
            {
                return Err(StoreError::DuplicateKey {
                    parent: resource.parent_id,
                    key: resource.resource_key,
                });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        resource.id = id;
        self.staged.insert(id, resource);
        self.inserted.push(id);
        Ok(id)
    }

    async fn update(&mut self, resource: &Resource) -> Result<(), StoreError> {
        let shared = Arc::clone(&self.state);
        let state = shared.read().await;
        if self.view(&state, resource.id).is_none() {
            return Err(StoreError::Missing(resource.id));
        }
        if self
            .children_of(&state, resource.parent_id)
            .into_iter()
            .any(|sibling| same_key(sibling, resource))
        {
            return Err(StoreError::DuplicateKey {
                parent: resource.parent_id,
                key: resource.resource_key.clone(),
            });
        }

        self.observe(&state, [resource.id]);
        self.staged.insert(resource.id, resource.clone());
        Ok(())
    }

    async fn platform_for_agent(&mut self, agent: AgentId) -> Result<Option<Resource>, StoreError> {
        let shared = Arc::clone(&self.state);
        let state = shared.read().await;
        let found = self
            .all(&state)
            .filter(|r| {
                r.parent_id.is_none()
                    && r.agent_id == Some(agent)
                    && r.category() == ResourceCategory::Platform
                    && r.inventory_status != InventoryStatus::Uninventoried
            })
            .min_by_key(|r| r.id)
            .cloned();
        self.observe(&state, found.iter().map(|r| r.id));
        Ok(found)
    }

    async fn find_by_status(
        &mut self,
        category: Option<ResourceCategory>,
        statuses: &[InventoryStatus],
    ) -> Result<Vec<Resource>, StoreError> {
        let shared = Arc::clone(&self.state);
        let state = shared.read().await;
        let mut found: Vec<_> = self
            .all(&state)
            .filter(|r| category.is_none_or(|c| r.category() == c))
            .filter(|r| statuses.contains(&r.inventory_status))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id);
        self.observe(&state, found.iter().map(|r| r.id));
        Ok(found)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut state = this.state.write().await;

        for id in this.staged.keys() {
            if let Some(base) = this.base.get(id)
                && state.revisions.get(id) != Some(base)
            {
                return Err(StoreError::Conflict(*id));
            }
        }

        // a concurrent unit of work may have claimed the same business key
        for new in this.staged.values() {
            if let Some(siblings) = state.children.get(&new.parent_id)
                && siblings
                    .iter()
                    .filter(|sid| !this.staged.contains_key(sid))
                    .filter_map(|sid| state.resources.get(sid))
                    .any(|existing| same_key(existing, new))
            {
                return Err(StoreError::DuplicateKey {
                    parent: new.parent_id,
                    key: new.resource_key.clone(),
                });
            }
        }

        let staged = this.staged.len();
        for id in &this.inserted {
            if let Some(new) = this.staged.get(id) {
                state.children.entry(new.parent_id).or_default().insert(*id);
            }
        }
        for id in this.staged.keys() {
            *state.revisions.entry(*id).or_default() += 1;
        }
        state.resources.extend(this.staged);

        debug!(staged, inserted = this.inserted.len(), "inventory transaction committed");
        Ok(())
    }
}
