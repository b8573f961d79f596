//! HTTP client for the fleetinv daemon

use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use fleetinv_api::{
    InventoryReport, InventoryReportResponse, InventoryStatus, MergeResourceResponse,
    ReportedResource, ResourceId, ResourceTypeRef, ResourceUpgradeRequest, ResourceUpgradeResponse,
    requests::{
        AddResourceRequest, ManualAddRequest, RegisterAgentRequest, ResourceIdsRequest,
        USER_HEADER, UpdateInventoryStatusRequest, UpdateVersionRequest,
    },
    responses::{
        AgentSummary, HealthResponse, QueuedPlatform, ResourceSummary, StatusChangeResponse,
        UpdateVersionResponse,
    },
};

use crate::error::{ClientError, Result};

/// HTTP client for communicating with the fleetinv daemon
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    user: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use fleetinv_client::HttpClient;
    ///
    /// let client = HttpClient::new("http://localhost:7080")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new HTTP client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self {
            client,
            base_url,
            user: None,
        })
    }

    /// Act as the given operator on queue operations
    #[must_use]
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Build a full URL from a path
    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(ClientError::Url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.user {
            Some(user) => builder.header(USER_HEADER, user),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        send(self.request(Method::GET, url)).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let url = self.url(path)?;
        send(self.request(Method::POST, url).json(body)).await
    }

    async fn put<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let url = self.url(path)?;
        send(self.request(Method::PUT, url).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        let response = self.request(Method::DELETE, url).send().await?;
        check(response).await.map(|_| ())
    }

    // System endpoints

    /// Get daemon health status
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    // Agent-facing endpoints

    /// Submit an inventory report
    ///
    /// A report referencing a type the server deleted fails with an error
    /// for which [`ClientError::is_stale_type`] holds.
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon rejects the report.
    ///
    /// # Example
    /// ```no_run
    /// # use fleetinv_client::HttpClient;
    /// # use fleetinv_api::{InventoryReport, ReportedResource, ResourceTypeRef};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = HttpClient::new("http://localhost:7080")?;
    /// let platform = ReportedResource::new("host1", "host1", ResourceTypeRef::new("Linux", "Platforms"));
    /// let response = client
    ///     .submit_report(&InventoryReport::new("agent-1", vec![platform]))
    ///     .await?;
    /// println!("merged {} resources", response.mappings.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_report(&self, report: &InventoryReport) -> Result<InventoryReportResponse> {
        self.post("/inventory/reports", report).await
    }

    /// Report a manually discovered resource back to the server
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn add_resource(&self, resource: ReportedResource, creator: &str) -> Result<MergeResourceResponse> {
        let request = AddResourceRequest {
            resource,
            creator: creator.to_string(),
        };
        self.post("/inventory/resources", &request).await
    }

    /// Push resource upgrades
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn upgrade_resources(
        &self,
        requests: &[ResourceUpgradeRequest],
    ) -> Result<Vec<ResourceUpgradeResponse>> {
        self.post("/inventory/upgrades", &requests).await
    }

    /// Record a resource's new version
    ///
    /// Returns `false` when the server does not know the resource.
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn update_resource_version(&self, resource_id: ResourceId, version: &str) -> Result<bool> {
        let request = UpdateVersionRequest {
            version: version.to_string(),
        };
        let response: UpdateVersionResponse = self
            .put(&format!("/resources/{resource_id}/version"), &request)
            .await?;
        Ok(response.found)
    }

    // Operator endpoints

    /// Get a single resource
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn get_resource(&self, resource_id: ResourceId) -> Result<ResourceSummary> {
        self.get(&format!("/resources/{resource_id}")).await
    }

    /// List queued platforms and their servers in the given statuses
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn queue(&self, statuses: &[InventoryStatus]) -> Result<Vec<QueuedPlatform>> {
        let mut url = self.url("/queue")?;
        if !statuses.is_empty() {
            let joined = statuses
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            url.query_pairs_mut().append_pair("status", &joined);
        }
        send(self.request(Method::GET, url)).await
    }

    /// Change the inventory status of platforms and servers
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn update_inventory_status(
        &self,
        platforms: Vec<ResourceId>,
        servers: Vec<ResourceId>,
        status: InventoryStatus,
    ) -> Result<StatusChangeResponse> {
        let request = UpdateInventoryStatusRequest {
            platforms,
            servers,
            status,
        };
        self.post("/queue/status", &request).await
    }

    /// Commit queued resources
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn import_resources(&self, resource_ids: Vec<ResourceId>) -> Result<StatusChangeResponse> {
        self.post("/queue/import", &ResourceIdsRequest { resource_ids }).await
    }

    /// Ignore queued resources
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn ignore_resources(&self, resource_ids: Vec<ResourceId>) -> Result<StatusChangeResponse> {
        self.post("/queue/ignore", &ResourceIdsRequest { resource_ids }).await
    }

    /// Return ignored resources to the queue
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn unignore_resources(&self, resource_ids: Vec<ResourceId>) -> Result<StatusChangeResponse> {
        self.post("/queue/unignore", &ResourceIdsRequest { resource_ids }).await
    }

    /// Ask the parent's agent to discover a resource
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn manually_add_resource(
        &self,
        resource_type: ResourceTypeRef,
        parent_id: ResourceId,
        plugin_configuration: serde_json::Value,
    ) -> Result<MergeResourceResponse> {
        let request = ManualAddRequest {
            resource_type,
            parent_id,
            plugin_configuration,
        };
        self.post("/resources", &request).await
    }

    // Agent registry endpoints

    /// List registered agents
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>> {
        self.get("/agents").await
    }

    /// Register an agent
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn register_agent(&self, name: &str, address: &str) -> Result<AgentSummary> {
        let request = RegisterAgentRequest {
            name: name.to_string(),
            address: address.to_string(),
        };
        self.post("/agents", &request).await
    }

    /// Unregister an agent
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn unregister_agent(&self, name: &str) -> Result<()> {
        self.delete(&format!("/agents/{name}")).await
    }
}

/// Send a request and deserialize a successful JSON response
pub(crate) async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = check(request.send().await?).await?;
    Ok(response.json().await?)
}

/// Turn a non-success response into [`ClientError::Api`]
pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => (
            json.get("code").and_then(|c| c.as_str()).map(str::to_string),
            json.get("message")
                .and_then(|m| m.as_str())
                .map_or_else(|| body.clone(), str::to_string),
        ),
        Err(_) => (None, body),
    };

    Err(ClientError::Api {
        status,
        code,
        message,
    })
}
