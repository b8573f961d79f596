//! HTTP router configuration

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::api::{agents, inventory, queue, resources, system};
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        .route("/openapi.json", get(system::openapi))
        // Agent-facing endpoints
        .route("/inventory/reports", post(inventory::submit_report))
        .route("/inventory/resources", post(inventory::add_resource))
        .route("/inventory/upgrades", post(inventory::upgrade_resources))
        // Discovery queue
        .route("/queue", get(queue::list_queue))
        .route("/queue/status", post(queue::update_status))
        .route("/queue/import", post(queue::import))
        .route("/queue/ignore", post(queue::ignore))
        .route("/queue/unignore", post(queue::unignore))
        // Resources
        .route("/resources", post(resources::manually_add))
        .route("/resources/{id}", get(resources::get_resource))
        .route("/resources/{id}/version", put(resources::update_version))
        // Agent registry
        .route("/agents", get(agents::list_agents).post(agents::register_agent))
        .route("/agents/{name}", axum::routing::delete(agents::unregister_agent))
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use fleetinv_api::{
        InventoryReport, InventoryReportResponse, InventoryStatus, ReportedResource,
        ResourceCategory, ResourceTypeRef,
        responses::{QueuedPlatform, StatusChangeResponse},
    };
    use fleetinv_core::actor::AgentRegistryActorArgs;
    use fleetinv_core::{
        AgentConfig, AgentRegistry, CompatibleGroups, DiscoveryService, DiscoveryServiceArgs,
        InMemoryInventory, InMemoryTypeCatalog, ResourceTypeConfig,
    };
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::factory::HttpAgentClientFactory;

    fn seed(name: &str, plugin: &str, category: ResourceCategory, deleted: bool) -> ResourceTypeConfig {
        ResourceTypeConfig {
            name: name.to_string(),
            plugin: plugin.to_string(),
            category,
            deleted,
            alert_templates: vec![],
        }
    }

    async fn app() -> Router {
        let mut config = Config::default();
        config.inventory.sync_timeout_secs = 1;
        config.resource_type = vec![
            seed("Linux", "Platforms", ResourceCategory::Platform, false),
            seed("Tomcat", "tomcat", ResourceCategory::Server, false),
            seed("Legacy", "old", ResourceCategory::Server, true),
        ];

        let (event_tx, _) = broadcast::channel(16);
        let store = InMemoryInventory::new();
        let catalog = Arc::new(InMemoryTypeCatalog::new(&config.resource_type));
        let registry = AgentRegistry::spawn(AgentRegistryActorArgs {
            client_factory: Arc::new(HttpAgentClientFactory::new(config.inventory.sync_timeout())),
            event_tx: event_tx.clone(),
            sync_timeout: config.inventory.sync_timeout(),
        });
        registry
            .register(AgentConfig {
                name: "agent-1".to_string(),
                // nothing listens here, so agent syncs fail
                address: "http://127.0.0.1:9".to_string(),
            })
            .await
            .unwrap();

        let service = Arc::new(DiscoveryService::new(DiscoveryServiceArgs {
            store: Arc::new(store.clone()),
            catalog: catalog.clone(),
            agents: Arc::new(registry.clone()),
            alert_templates: catalog,
            product_versions: Arc::new(store),
            groups: Arc::new(CompatibleGroups::new()),
            config: config.inventory.clone(),
            event_tx,
        }));

        create_router(Arc::new(AppState::new(service, registry, config)))
    }

    fn json_request(method: &str, uri: &str, body: &impl serde::Serialize) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn read<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_report_then_import() {
        let app = app().await;
        let platform = ReportedResource::new("host1", "host1", ResourceTypeRef::new("Linux", "Platforms"));
        let uuid = platform.uuid;
        let report = InventoryReport::new("agent-1", vec![platform]);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/inventory/reports", &report))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let merged: InventoryReportResponse = read(response).await;
        let id = merged.id_for(&uuid).unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/queue?status=NEW").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let queue: Vec<QueuedPlatform> = read(response).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].platform.agent.as_deref(), Some("agent-1"));

        let body = serde_json::json!({ "resource_ids": [id] });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/queue/import", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome: StatusChangeResponse = read(response).await;
        assert_eq!(outcome.dispatched, 1);
        assert_eq!(outcome.failed, 1);

        let response = app
            .oneshot(Request::builder().uri(format!("/resources/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let resource: fleetinv_api::responses::ResourceSummary = read(response).await;
        assert_eq!(resource.status, InventoryStatus::Committed);
    }

    #[tokio::test]
    async fn test_stale_type_is_conflict() {
        let platform = ReportedResource::new("host1", "host1", ResourceTypeRef::new("Legacy", "old"));
        let report = InventoryReport::new("agent-1", vec![platform]);

        let response = app()
            .await
            .oneshot(json_request("POST", "/inventory/reports", &report))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error: crate::api::ApiError = read(response).await;
        assert_eq!(error.code, "STALE_TYPE");
    }

    #[tokio::test]
    async fn test_unknown_agent_is_bad_request() {
        let platform = ReportedResource::new("host1", "host1", ResourceTypeRef::new("Linux", "Platforms"));
        let report = InventoryReport::new("stranger", vec![platform]);

        let response = app()
            .await
            .oneshot(json_request("POST", "/inventory/reports", &report))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: crate::api::ApiError = read(response).await;
        assert_eq!(error.code, "INVALID_REPORT");
    }

    #[tokio::test]
    async fn test_register_duplicate_agent() {
        let body = serde_json::json!({ "name": "agent-1", "address": "http://10.0.0.9:16163" });
        let response = app()
            .await
            .oneshot(json_request("POST", "/agents", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/resources/404").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
