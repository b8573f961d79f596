//! Server to agent transport

use std::time::Duration;

use reqwest::Client;
use url::Url;

use fleetinv_api::{
    MergeResourceResponse, ResourceId, ResourceTypeRef, SyncSet,
    requests::{AgentDiscoverRequest, AgentSyncRequest},
};

use crate::error::{ClientError, Result};
use crate::http::{check, send};

/// HTTP endpoint of a single agent
#[derive(Debug, Clone)]
pub struct AgentEndpoint {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl AgentEndpoint {
    /// Create an endpoint for the agent listening at `address`
    ///
    /// # Errors
    /// Returns an error if the address is not a valid URL.
    pub fn new(address: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: Url::parse(address.as_ref())?,
            timeout,
        })
    }

    #[must_use]
    pub fn address(&self) -> &Url {
        &self.base_url
    }

    /// Ask the agent to resynchronize a resource subtree
    ///
    /// # Errors
    /// Returns an error if the agent cannot be reached or rejects the request.
    pub async fn synchronize_inventory(&self, resource_id: ResourceId, sync: &SyncSet) -> Result<()> {
        let request = AgentSyncRequest {
            resource_id,
            sync: sync.iter().copied().collect(),
        };
        let url = self.base_url.join("/inventory/sync")?;
        tracing::debug!(%url, resource_id, "sending synchronization request");

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(timeout_aware)?;
        check(response).await.map(|_| ())
    }

    /// Ask the agent to discover a resource and report it back
    ///
    /// # Errors
    /// Returns an error if the agent cannot be reached or rejects the request.
    pub async fn discover_resource(
        &self,
        resource_type: &ResourceTypeRef,
        parent_id: ResourceId,
        plugin_configuration: &serde_json::Value,
        creator: &str,
    ) -> Result<MergeResourceResponse> {
        let request = AgentDiscoverRequest {
            resource_type: resource_type.clone(),
            parent_id,
            plugin_configuration: plugin_configuration.clone(),
            creator: creator.to_string(),
        };
        let url = self.base_url.join("/inventory/discover")?;

        send(self.client.post(url).timeout(self.timeout).json(&request)).await
    }
}

fn timeout_aware(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Http(e)
    }
}
