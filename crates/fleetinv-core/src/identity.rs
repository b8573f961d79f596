//! Matching reported resources against the existing inventory

use fleetinv_api::{ROOT_ID, ReportedResource, ResourceId};
use tracing::debug;

use crate::error::StoreError;
use crate::model::{Resource, ResourceType};
use crate::store::InventoryTx;

/// An existing resource matched by a report, with its children loaded
#[derive(Debug, Clone)]
pub struct Matched {
    pub resource: Resource,
    pub children: Vec<Resource>,
}

/// Where a reported resource is looked up
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    /// Resolved parent, `None` for top-level platforms
    pub parent: Option<ResourceId>,
    /// Server-side type the report resolved to
    pub resource_type: &'a ResourceType,
    /// Children of the parent already loaded by the caller, searched first
    pub known_siblings: Option<&'a [Resource]>,
}

/// Resolves reported resources to existing inventory records
///
/// Order: the server id the agent remembers, then the
/// `(parent, resource_key, type, plugin)` business key. A stale id that
/// matches nothing is reset to [`ROOT_ID`], and a business key hit
/// overwrites the reported id.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub async fn resolve(
        &self,
        tx: &mut dyn InventoryTx,
        reported: &mut ReportedResource,
        lookup: Lookup<'_>,
    ) -> Result<Option<Matched>, StoreError> {
        if reported.id != ROOT_ID
            && let Some(resource) = tx.find(reported.id).await?
        {
            let children = tx.children(resource.id).await?;
            return Ok(Some(Matched { resource, children }));
        }

        let key = reported.resource_key.as_deref().unwrap_or_default();
        let known = lookup.known_siblings.and_then(|siblings| {
            siblings
                .iter()
                .find(|r| {
                    r.resource_key == key
                        && r.resource_type.name == lookup.resource_type.name
                        && r.resource_type.plugin == lookup.resource_type.plugin
                })
                .cloned()
        });
        // siblings created earlier in the same unit of work are only in the store
        let by_key = match known {
            Some(resource) => Some(resource),
            None => {
                tx.find_by_business_key(
                    lookup.parent,
                    key,
                    &lookup.resource_type.name,
                    &lookup.resource_type.plugin,
                )
                .await?
            }
        };

        match by_key {
            Some(resource) => {
                if reported.id != resource.id {
                    debug!(
                        reported_id = reported.id,
                        resource_id = resource.id,
                        resource_key = %resource.resource_key,
                        "repairing stale resource id from business key"
                    );
                }
                reported.id = resource.id;
                let children = tx.children(resource.id).await?;
                Ok(Some(Matched { resource, children }))
            }
            None => {
                if reported.id != ROOT_ID {
                    debug!(reported_id = reported.id, "discarding unknown resource id");
                }
                reported.id = ROOT_ID;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fleetinv_api::{InventoryStatus, ResourceCategory, ResourceTypeRef};
    use uuid::Uuid;

    use super::*;
    use crate::store::{InMemoryInventory, InventoryStore};

    fn platform_type() -> ResourceType {
        ResourceType {
            id: 1,
            name: "Linux".to_string(),
            plugin: "Platforms".to_string(),
            category: ResourceCategory::Platform,
            deleted: false,
        }
    }

    async fn seed(store: &InMemoryInventory, key: &str) -> ResourceId {
        let now = Utc::now();
        let mut tx = store.begin().await.unwrap();
        let id = tx
            .insert(Resource {
                id: 0,
                uuid: Uuid::new_v4(),
                resource_key: key.to_string(),
                name: key.to_string(),
                resource_type: platform_type(),
                parent_id: None,
                agent_id: Some(1),
                inventory_status: InventoryStatus::Committed,
                version: None,
                product_version_id: None,
                description: None,
                plugin_configuration: serde_json::Value::Null,
                ctime: now,
                itime: now,
                mtime: now,
                modified_by: "system".to_string(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    fn reported(key: &str) -> ReportedResource {
        ReportedResource::new(key, key, ResourceTypeRef::new("Linux", "Platforms"))
    }

    fn lookup(resource_type: &ResourceType) -> Lookup<'_> {
        Lookup {
            parent: None,
            resource_type,
            known_siblings: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_by_id() {
        let store = InMemoryInventory::new();
        let id = seed(&store, "host1").await;
        let resource_type = platform_type();

        let mut tx = store.begin().await.unwrap();
        // key differs, id wins
        let mut report = reported("renamed").with_id(id);
        let matched = IdentityResolver
            .resolve(tx.as_mut(), &mut report, lookup(&resource_type))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.resource.id, id);
    }

    #[tokio::test]
    async fn test_stale_id_repaired_from_business_key() {
        let store = InMemoryInventory::new();
        let id = seed(&store, "host1").await;
        let resource_type = platform_type();

        let mut tx = store.begin().await.unwrap();
        let mut report = reported("host1").with_id(9999);
        let matched = IdentityResolver
            .resolve(tx.as_mut(), &mut report, lookup(&resource_type))
            .await
            .unwrap();

        assert_eq!(matched.unwrap().resource.id, id);
        assert_eq!(report.id, id);
    }

    #[tokio::test]
    async fn test_unknown_id_reset() {
        let store = InMemoryInventory::new();
        seed(&store, "host1").await;
        let resource_type = platform_type();

        let mut tx = store.begin().await.unwrap();
        let mut report = reported("host2").with_id(9999);
        let matched = IdentityResolver
            .resolve(tx.as_mut(), &mut report, lookup(&resource_type))
            .await
            .unwrap();

        assert!(matched.is_none());
        assert_eq!(report.id, ROOT_ID);
    }
}
