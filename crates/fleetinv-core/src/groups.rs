//! Implicit compatible groups, one per resource type

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;
use fleetinv_api::ResourceId;

use crate::model::{Resource, ResourceTypeId};
use crate::traits::GroupMembership;

#[derive(Debug, Default)]
pub struct CompatibleGroups {
    members: DashMap<ResourceTypeId, BTreeSet<ResourceId>>,
}

impl CompatibleGroups {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Members of the compatible group for a type
    #[must_use]
    pub fn members(&self, type_id: ResourceTypeId) -> BTreeSet<ResourceId> {
        self.members
            .get(&type_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GroupMembership for CompatibleGroups {
    async fn update_implicit_membership(&self, resource: &Resource) -> Result<(), String> {
        self.members
            .entry(resource.resource_type.id)
            .or_default()
            .insert(resource.id);
        Ok(())
    }
}
