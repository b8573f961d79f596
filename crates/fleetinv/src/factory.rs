//! Agent client factory backed by the HTTP agent transport

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetinv_api::{MergeResourceResponse, ResourceId, ResourceTypeRef, SyncSet};
use fleetinv_client::AgentEndpoint;
use fleetinv_core::{Agent, AgentClient, AgentClientFactory};

/// Creates an [`HttpAgentClient`] per registered agent
pub struct HttpAgentClientFactory {
    timeout: Duration,
}

impl HttpAgentClientFactory {
    /// Create a new factory whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl AgentClientFactory for HttpAgentClientFactory {
    async fn create_client(&self, agent: &Agent) -> Arc<dyn AgentClient> {
        let endpoint = AgentEndpoint::new(&agent.address, self.timeout).map_err(|e| {
            tracing::warn!(agent = %agent.name, address = %agent.address, error = %e, "agent address is not usable");
            format!("invalid agent address '{}': {e}", agent.address)
        });
        Arc::new(HttpAgentClient { endpoint })
    }
}

/// `AgentClient` speaking HTTP to the agent's callback address
pub struct HttpAgentClient {
    endpoint: Result<AgentEndpoint, String>,
}

impl HttpAgentClient {
    fn endpoint(&self) -> Result<&AgentEndpoint, String> {
        self.endpoint.as_ref().map_err(Clone::clone)
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn synchronize_inventory(&self, resource_id: ResourceId, sync: &SyncSet) -> Result<(), String> {
        self.endpoint()?
            .synchronize_inventory(resource_id, sync)
            .await
            .map_err(|e| e.to_string())
    }

    async fn manually_add_resource(
        &self,
        resource_type: &ResourceTypeRef,
        parent_id: ResourceId,
        plugin_configuration: &serde_json::Value,
        creator: &str,
    ) -> Result<MergeResourceResponse, String> {
        self.endpoint()?
            .discover_resource(resource_type, parent_id, plugin_configuration, creator)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use fleetinv_api::SyncType;

    use super::*;

    #[tokio::test]
    async fn test_invalid_address_fails_calls() {
        let factory = HttpAgentClientFactory::new(Duration::from_millis(100));
        let agent = Agent {
            id: 1,
            name: "agent-1".to_string(),
            address: "not a url".to_string(),
        };

        let client = factory.create_client(&agent).await;
        let err = client
            .synchronize_inventory(1, &SyncSet::from([SyncType::Status]))
            .await
            .unwrap_err();
        assert!(err.contains("invalid agent address"));
    }
}
