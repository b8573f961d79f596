//! `AgentActor`: Per-agent transport
//!
//! Owns the outbound client for one agent, bounds every call with the
//! configured timeout and tracks synchronization health.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetinv_api::MergeResourceResponse;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::message::{AgentStatus, GetAgentStatus, ManuallyAdd, Synchronize};
use crate::model::Agent;
use crate::traits::AgentClient;

/// Arguments for spawning an `AgentActor`
pub struct AgentActorArgs {
    pub agent: Agent,
    /// Outbound transport
    pub client: Arc<dyn AgentClient>,
    /// Upper bound on each agent call
    pub timeout: Duration,
}

/// Per-agent actor serializing calls to one agent
pub struct AgentActor {
    agent: Agent,
    client: Arc<dyn AgentClient>,
    timeout: Duration,
    last_sync: Option<DateTime<Utc>>,
    sync_failures: u32,
}

impl AgentActor {
    /// Get the agent name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.agent.name
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, String>>,
    ) -> Result<T, CoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CoreError::AgentError(e)),
            Err(_) => Err(CoreError::Timeout),
        }
    }
}

impl Actor for AgentActor {
    type Args = AgentActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(agent = %args.agent.name, id = %actor_ref.id(), "AgentActor starting");

        Ok(Self {
            agent: args.agent,
            client: args.client,
            timeout: args.timeout,
            last_sync: None,
            sync_failures: 0,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(agent = %self.agent.name, reason = ?reason, "AgentActor stopping");
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Synchronize> for AgentActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: Synchronize,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let client = Arc::clone(&self.client);
        let result = self
            .bounded(client.synchronize_inventory(msg.resource_id, &msg.sync))
            .await;

        match &result {
            Ok(()) => {
                self.last_sync = Some(Utc::now());
                self.sync_failures = 0;
            }
            Err(e) => {
                self.sync_failures += 1;
                warn!(
                    agent = %self.agent.name,
                    resource_id = msg.resource_id,
                    failures = self.sync_failures,
                    error = %e,
                    "agent synchronization failed"
                );
            }
        }

        result
    }
}

impl Message<ManuallyAdd> for AgentActor {
    type Reply = Result<MergeResourceResponse, CoreError>;

    async fn handle(
        &mut self,
        msg: ManuallyAdd,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        info!(
            agent = %self.agent.name,
            resource_type = %msg.resource_type,
            parent_id = msg.parent_id,
            "asking agent to discover resource"
        );

        let client = Arc::clone(&self.client);
        self.bounded(client.manually_add_resource(
            &msg.resource_type,
            msg.parent_id,
            &msg.plugin_configuration,
            &msg.creator,
        ))
        .await
    }
}

impl Message<GetAgentStatus> for AgentActor {
    type Reply = AgentStatus;

    async fn handle(
        &mut self,
        _msg: GetAgentStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        AgentStatus {
            id: self.agent.id,
            name: self.agent.name.clone(),
            address: self.agent.address.clone(),
            last_sync: self.last_sync,
            sync_failures: self.sync_failures,
        }
    }
}
