//! In-memory resource type catalog seeded from configuration

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use fleetinv_api::ResourceId;
use tracing::debug;

use crate::config::ResourceTypeConfig;
use crate::model::{ResourceType, ResourceTypeId};
use crate::traits::{AlertTemplates, ResourceTypeCatalog};

/// Static type catalog with per-type alert templates
///
/// Also records the alert definitions instantiated from those templates.
#[derive(Debug, Default)]
pub struct InMemoryTypeCatalog {
    types: DashMap<(String, String), ResourceType>,
    templates: HashMap<ResourceTypeId, Vec<String>>,
    definitions: DashMap<ResourceId, Vec<String>>,
}

impl InMemoryTypeCatalog {
    /// Build the catalog, assigning type ids in seed order starting at 1
    #[must_use]
    pub fn new(seed: &[ResourceTypeConfig]) -> Self {
        let types = DashMap::with_capacity(seed.len());
        let mut templates = HashMap::new();

        for (id, config) in (1..).zip(seed) {
            let resource_type = ResourceType {
                id,
                name: config.name.clone(),
                plugin: config.plugin.clone(),
                category: config.category,
                deleted: config.deleted,
            };
            if !config.alert_templates.is_empty() {
                templates.insert(id, config.alert_templates.clone());
            }
            types.insert((config.name.clone(), config.plugin.clone()), resource_type);
        }

        Self {
            types,
            templates,
            definitions: DashMap::new(),
        }
    }

    /// Number of known types, deleted ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Mark a type as deleted so later reports using it are stale
    pub fn mark_deleted(&self, name: &str, plugin: &str) -> bool {
        match self.types.get_mut(&(name.to_string(), plugin.to_string())) {
            Some(mut entry) => {
                entry.deleted = true;
                true
            }
            None => false,
        }
    }

    /// Alert definitions instantiated for a resource
    #[must_use]
    pub fn definitions_for(&self, resource_id: ResourceId) -> Vec<String> {
        self.definitions
            .get(&resource_id)
            .map(|defs| defs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceTypeCatalog for InMemoryTypeCatalog {
    async fn lookup(&self, name: &str, plugin: &str) -> Option<ResourceType> {
        self.types
            .get(&(name.to_string(), plugin.to_string()))
            .map(|entry| entry.clone())
    }
}

#[async_trait]
impl AlertTemplates for InMemoryTypeCatalog {
    async fn instantiate_for(&self, resource_id: ResourceId, type_id: ResourceTypeId) -> Result<usize, String> {
        let Some(templates) = self.templates.get(&type_id) else {
            return Ok(0);
        };

        debug!(resource_id, type_id, count = templates.len(), "instantiating alert templates");
        self.definitions.insert(resource_id, templates.clone());
        Ok(templates.len())
    }
}

#[cfg(test)]
mod tests {
    use fleetinv_api::ResourceCategory;

    use super::*;

    fn seed() -> Vec<ResourceTypeConfig> {
        vec![
            ResourceTypeConfig {
                name: "Linux".to_string(),
                plugin: "Platforms".to_string(),
                category: ResourceCategory::Platform,
                deleted: false,
                alert_templates: vec![],
            },
            ResourceTypeConfig {
                name: "Tomcat".to_string(),
                plugin: "tomcat".to_string(),
                category: ResourceCategory::Server,
                deleted: false,
                alert_templates: vec!["availability".to_string(), "heap".to_string()],
            },
        ]
    }

    #[tokio::test]
    async fn test_lookup() {
        let catalog = InMemoryTypeCatalog::new(&seed());

        let tomcat = catalog.lookup("Tomcat", "tomcat").await.unwrap();
        assert_eq!(tomcat.id, 2);
        assert_eq!(tomcat.category, ResourceCategory::Server);

        // plugin is part of the identity
        assert!(catalog.lookup("Tomcat", "jboss").await.is_none());
    }

    #[tokio::test]
    async fn test_mark_deleted() {
        let catalog = InMemoryTypeCatalog::new(&seed());
        assert!(catalog.mark_deleted("Linux", "Platforms"));
        assert!(catalog.lookup("Linux", "Platforms").await.unwrap().deleted);
        assert!(!catalog.mark_deleted("Windows", "Platforms"));
    }

    #[tokio::test]
    async fn test_instantiate_templates() {
        let catalog = InMemoryTypeCatalog::new(&seed());

        assert_eq!(catalog.instantiate_for(7, 1).await.unwrap(), 0);
        assert!(catalog.definitions_for(7).is_empty());

        assert_eq!(catalog.instantiate_for(8, 2).await.unwrap(), 2);
        assert_eq!(catalog.definitions_for(8), vec!["availability", "heap"]);
    }
}
