//! fleetinv daemon
//!
//! Inventory reconciliation server: merges agent inventory reports into the
//! resource graph and serves the discovery queue over HTTP.

use std::sync::Arc;

use color_eyre::Result;
use fleetinv_api::events::InventoryEvent;
use fleetinv_core::actor::AgentRegistryActorArgs;
use fleetinv_core::{
    AgentRegistry, CompatibleGroups, DiscoveryService, DiscoveryServiceArgs, InMemoryInventory,
    InMemoryTypeCatalog,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod factory;
mod router;
mod state;

use crate::config::{Config, DaemonConfig, LogFormat};
use crate::factory::HttpAgentClientFactory;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (config, source) = Config::load_default()?;
    init_tracing(&config.daemon);
    match &source {
        Some(path) => info!(path = %path.display(), "loaded configuration"),
        None => warn!("no config file found, using defaults"),
    }

    let (event_tx, _) = broadcast::channel(config.inventory.event_channel_capacity);
    let store = InMemoryInventory::new();
    let catalog = Arc::new(InMemoryTypeCatalog::new(&config.resource_type));
    info!(types = catalog.len(), "resource type catalog seeded");

    let registry = AgentRegistry::spawn(AgentRegistryActorArgs {
        client_factory: Arc::new(HttpAgentClientFactory::new(config.inventory.sync_timeout())),
        event_tx: event_tx.clone(),
        sync_timeout: config.inventory.sync_timeout(),
    });
    for agent in &config.agent {
        registry.register(agent.clone()).await?;
    }

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
    tokio::spawn(log_events(service.subscribe()));

    let bind = config.daemon.bind.clone();
    let app = router::create_router(Arc::new(AppState::new(service, registry.clone(), config)));
    let listener = TcpListener::bind(&bind).await?;
    info!(bind = %bind, "fleetinv daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    info!("fleetinv daemon stopped");
    Ok(())
}

fn init_tracing(daemon: &DaemonConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&daemon.log_level));

    match daemon.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// Log inventory events until the channel closes
async fn log_events(mut rx: broadcast::Receiver<InventoryEvent>) {
    loop {
        match rx.recv().await {
            Ok(InventoryEvent::ReportMerged {
                agent,
                merged,
                failed_roots,
                elapsed_ms,
            }) => info!(%agent, merged, failed_roots, elapsed_ms, "report merged"),
            Ok(InventoryEvent::ResourceRevived { resource_id, name }) => {
                warn!(resource_id, %name, "deleted resource re-reported, back in the discovery queue");
            }
            Ok(InventoryEvent::AgentSyncFailed {
                agent,
                resource_id,
                error,
            }) => warn!(%agent, resource_id, %error, "agent out of sync"),
            Ok(event) => debug!(?event, "inventory event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event logger lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
