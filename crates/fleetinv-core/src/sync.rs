//! Best-effort agent resynchronization after status changes

use std::collections::BTreeSet;
use std::sync::Arc;

use fleetinv_api::events::InventoryEvent;
use fleetinv_api::responses::StatusChangeResponse;
use fleetinv_api::{InventoryStatus, ResourceId, SyncSet, SyncType};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::model::{AgentId, Resource};
use crate::traits::AgentDirectory;

/// One synchronization request for an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub agent: AgentId,
    pub resource_id: ResourceId,
    pub sync: SyncSet,
}

/// Result of a dispatch round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub dispatched: usize,
    pub failed: usize,
}

impl From<SyncReport> for StatusChangeResponse {
    fn from(report: SyncReport) -> Self {
        Self {
            dispatched: report.dispatched,
            failed: report.failed,
        }
    }
}

/// Asks agents to resynchronize resources whose status changed
///
/// The server's view is authoritative: failures are logged and reported,
/// never propagated.
pub struct SyncDispatcher {
    agents: Arc<dyn AgentDirectory>,
    event_tx: broadcast::Sender<InventoryEvent>,
}

impl SyncDispatcher {
    pub fn new(agents: Arc<dyn AgentDirectory>, event_tx: broadcast::Sender<InventoryEvent>) -> Self {
        Self { agents, event_tx }
    }

    /// Work out which agents to ask for what
    ///
    /// Platforms sync status, plus measurement schedules when committed.
    /// Servers under a synced platform are covered by it; the rest sync
    /// status only.
    #[must_use]
    pub fn plan(platforms: &[Resource], servers: &[Resource], status: InventoryStatus) -> Vec<SyncTarget> {
        let mut platform_sync = SyncSet::from([SyncType::Status]);
        if status == InventoryStatus::Committed {
            platform_sync.insert(SyncType::MeasurementSchedules);
        }

        let mut covered = BTreeSet::new();
        let mut targets = Vec::with_capacity(platforms.len() + servers.len());

        for platform in platforms {
            covered.insert(platform.id);
            if let Some(agent) = platform.agent_id {
                targets.push(SyncTarget {
                    agent,
                    resource_id: platform.id,
                    sync: platform_sync.clone(),
                });
            }
        }

        for server in servers {
            if server.parent_id.is_some_and(|p| covered.contains(&p)) {
                continue;
            }
            if let Some(agent) = server.agent_id {
                targets.push(SyncTarget {
                    agent,
                    resource_id: server.id,
                    sync: SyncSet::from([SyncType::Status]),
                });
            }
        }

        targets
    }

    pub async fn dispatch(&self, targets: Vec<SyncTarget>) -> SyncReport {
        let mut report = SyncReport::default();

        for target in targets {
            report.dispatched += 1;
            debug!(
                agent = target.agent,
                resource_id = target.resource_id,
                sync = ?target.sync,
                "requesting agent synchronization"
            );

            let result = self
                .agents
                .synchronize_inventory(target.agent, target.resource_id, target.sync)
                .await;

            if let Err(e) = result {
                report.failed += 1;
                warn!(
                    agent = target.agent,
                    resource_id = target.resource_id,
                    error = %e,
                    "could not synchronize agent after status change"
                );
                let agent = match self.agents.find_by_id(target.agent).await {
                    Ok(Some(agent)) => agent.name,
                    _ => target.agent.to_string(),
                };
                let _ = self.event_tx.send(InventoryEvent::AgentSyncFailed {
                    agent,
                    resource_id: target.resource_id,
                    error: e.to_string(),
                });
            }
        }

        report
    }
}
