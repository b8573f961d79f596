//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use fleetinv_api::events::InventoryEvent;
use fleetinv_api::{
    InventoryStatus, MergeResourceResponse, ReportedResource, ResourceCategory, ResourceId,
    ResourceTypeRef, SyncSet,
};
use tokio::sync::broadcast;

use fleetinv_core::actor::AgentRegistryActorArgs;
use fleetinv_core::*;

pub const AGENT: &str = "agent-1";
pub const USER: &str = "rhqadmin";

// Mock implementations

/// Agent transport that records every call
#[derive(Default)]
pub struct RecordingAgentClient {
    pub syncs: Mutex<Vec<(ResourceId, SyncSet)>>,
    pub fail_sync: bool,
    pub delay: Option<Duration>,
    /// Server the agent reports manually added resources to
    pub server: OnceLock<Arc<DiscoveryService>>,
}

impl RecordingAgentClient {
    pub fn syncs(&self) -> Vec<(ResourceId, SyncSet)> {
        self.syncs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentClient for RecordingAgentClient {
    async fn synchronize_inventory(&self, resource_id: ResourceId, sync: &SyncSet) -> Result<(), String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.syncs.lock().unwrap().push((resource_id, sync.clone()));
        if self.fail_sync {
            return Err("connection refused".to_string());
        }
        Ok(())
    }

    async fn manually_add_resource(
        &self,
        resource_type: &ResourceTypeRef,
        parent_id: ResourceId,
        plugin_configuration: &serde_json::Value,
        creator: &str,
    ) -> Result<MergeResourceResponse, String> {
        let server = self.server.get().ok_or("agent not connected to a server")?;

        let key = plugin_configuration
            .get("key")
            .and_then(|k| k.as_str())
            .unwrap_or("manual")
            .to_string();
        let mut resource = ReportedResource::new(&key, &key, resource_type.clone()).with_parent(parent_id);
        resource.plugin_configuration = plugin_configuration.clone();

        server
            .add_resource(resource, creator)
            .await
            .map_err(|e| e.to_string())
    }
}

pub struct TestClientFactory {
    pub client: Arc<RecordingAgentClient>,
}

#[async_trait]
impl AgentClientFactory for TestClientFactory {
    async fn create_client(&self, _agent: &Agent) -> Arc<dyn AgentClient> {
        self.client.clone()
    }
}

/// Alert subsystem that records instantiations
#[derive(Default)]
pub struct RecordingAlerts {
    pub instantiated: Mutex<Vec<ResourceId>>,
    pub fail: bool,
}

impl RecordingAlerts {
    pub fn instantiated(&self) -> Vec<ResourceId> {
        self.instantiated.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertTemplates for RecordingAlerts {
    async fn instantiate_for(&self, resource_id: ResourceId, _type_id: ResourceTypeId) -> Result<usize, String> {
        self.instantiated.lock().unwrap().push(resource_id);
        if self.fail {
            return Err("alert subsystem unavailable".to_string());
        }
        Ok(1)
    }
}

/// Store whose transactions fail to insert resources with chosen keys
pub struct FlakyStore {
    pub inner: InMemoryInventory,
    pub poisoned: HashSet<String>,
}

#[async_trait]
impl InventoryStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn InventoryTx>, StoreError> {
        Ok(Box::new(FlakyTx {
            inner: self.inner.begin().await?,
            poisoned: self.poisoned.clone(),
        }))
    }
}

struct FlakyTx {
    inner: Box<dyn InventoryTx>,
    poisoned: HashSet<String>,
}

#[async_trait]
impl InventoryTx for FlakyTx {
    async fn find(&mut self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        self.inner.find(id).await
    }

    async fn find_by_business_key(
        &mut self,
        parent: Option<ResourceId>,
        resource_key: &str,
        type_name: &str,
        plugin: &str,
    ) -> Result<Option<Resource>, StoreError> {
        self.inner
            .find_by_business_key(parent, resource_key, type_name, plugin)
            .await
    }

    async fn children(&mut self, id: ResourceId) -> Result<Vec<Resource>, StoreError> {
        self.inner.children(id).await
    }

    async fn insert(&mut self, resource: Resource) -> Result<ResourceId, StoreError> {
        if self.poisoned.contains(&resource.resource_key) {
            return Err(StoreError::Backend(format!("disk full writing {}", resource.resource_key)));
        }
        self.inner.insert(resource).await
    }

    async fn update(&mut self, resource: &Resource) -> Result<(), StoreError> {
        self.inner.update(resource).await
    }

    async fn platform_for_agent(&mut self, agent: AgentId) -> Result<Option<Resource>, StoreError> {
        self.inner.platform_for_agent(agent).await
    }

    async fn find_by_status(
        &mut self,
        category: Option<ResourceCategory>,
        statuses: &[InventoryStatus],
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner.find_by_status(category, statuses).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }
}

// Fixtures

pub fn type_seed() -> Vec<ResourceTypeConfig> {
    let seed = |name: &str, plugin: &str, category: ResourceCategory, deleted: bool| ResourceTypeConfig {
        name: name.to_string(),
        plugin: plugin.to_string(),
        category,
        deleted,
        alert_templates: vec![],
    };

    vec![
        seed("Linux", "Platforms", ResourceCategory::Platform, false),
        seed("Tomcat", "tomcat", ResourceCategory::Server, false),
        seed("Context", "tomcat", ResourceCategory::Service, false),
        seed("Platform", "testPlugin", ResourceCategory::Platform, false),
        seed("Server", "testPlugin", ResourceCategory::Server, false),
        seed("Legacy", "old", ResourceCategory::Server, true),
    ]
}

pub fn platform(key: &str) -> ReportedResource {
    ReportedResource::new(key, key, ResourceTypeRef::new("Linux", "Platforms"))
}

pub fn server(key: &str) -> ReportedResource {
    ReportedResource::new(key, key, ResourceTypeRef::new("Tomcat", "tomcat"))
}

pub fn service(key: &str) -> ReportedResource {
    ReportedResource::new(key, key, ResourceTypeRef::new("Context", "tomcat"))
}

pub struct Harness {
    pub service: Arc<DiscoveryService>,
    pub store: InMemoryInventory,
    pub catalog: Arc<InMemoryTypeCatalog>,
    pub alerts: Arc<RecordingAlerts>,
    pub groups: Arc<CompatibleGroups>,
    pub client: Arc<RecordingAgentClient>,
    pub registry: AgentRegistry,
    pub events: broadcast::Receiver<InventoryEvent>,
}

pub struct HarnessBuilder {
    client: RecordingAgentClient,
    alerts: RecordingAlerts,
    poisoned: HashSet<String>,
    config: InventoryConfig,
}

impl HarnessBuilder {
    pub fn failing_sync(mut self) -> Self {
        self.client.fail_sync = true;
        self
    }

    pub fn slow_sync(mut self, delay: Duration) -> Self {
        self.client.delay = Some(delay);
        self
    }

    pub fn failing_alerts(mut self) -> Self {
        self.alerts.fail = true;
        self
    }

    pub fn poison_key(mut self, key: &str) -> Self {
        self.poisoned.insert(key.to_string());
        self
    }

    pub fn config(mut self, config: InventoryConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> Harness {
        let (event_tx, events) = broadcast::channel(1024);
        let store = InMemoryInventory::new();
        let catalog = Arc::new(InMemoryTypeCatalog::new(&type_seed()));
        let alerts = Arc::new(self.alerts);
        let groups = Arc::new(CompatibleGroups::new());
        let client = Arc::new(self.client);

        let registry = AgentRegistry::spawn(AgentRegistryActorArgs {
            client_factory: Arc::new(TestClientFactory {
                client: client.clone(),
            }),
            event_tx: event_tx.clone(),
            sync_timeout: self.config.sync_timeout(),
        });
        registry
            .register(AgentConfig {
                name: AGENT.to_string(),
                address: "http://agent-1:16163".to_string(),
            })
            .await
            .unwrap();

        let inventory: Arc<dyn InventoryStore> = if self.poisoned.is_empty() {
            Arc::new(store.clone())
        } else {
            Arc::new(FlakyStore {
                inner: store.clone(),
                poisoned: self.poisoned,
            })
        };

        let service = Arc::new(DiscoveryService::new(DiscoveryServiceArgs {
            store: inventory,
            catalog: catalog.clone(),
            agents: Arc::new(registry.clone()),
            alert_templates: alerts.clone(),
            product_versions: Arc::new(store.clone()),
            groups: groups.clone(),
            config: self.config,
            event_tx,
        }));
        let _ = client.server.set(service.clone());

        Harness {
            service,
            store,
            catalog,
            alerts,
            groups,
            client,
            registry,
            events,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            client: RecordingAgentClient::default(),
            alerts: RecordingAlerts::default(),
            poisoned: HashSet::new(),
            config: InventoryConfig::default(),
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub async fn status_of(&self, id: ResourceId) -> InventoryStatus {
        self.store.get(id).await.unwrap().inventory_status
    }

    /// Overwrite a committed resource's status, bypassing the policy
    pub async fn force_status(&self, id: ResourceId, status: InventoryStatus) {
        let mut tx = self.store.begin().await.unwrap();
        let mut resource = tx.find(id).await.unwrap().unwrap();
        resource.inventory_status = status;
        tx.update(&resource).await.unwrap();
        tx.commit().await.unwrap();
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<InventoryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
