//! `AgentRegistryActor`: Registered agents
//!
//! Owns the name to agent map and one `AgentActor` per agent. The
//! [`AgentRegistry`] handle exposes it to the engine as an
//! [`AgentDirectory`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetinv_api::events::InventoryEvent;
use fleetinv_api::{MergeResourceResponse, ResourceId, ResourceTypeRef, SyncSet};
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::{ActorStopReason, SendError};
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::actor::agent::{AgentActor, AgentActorArgs};
use crate::config::AgentConfig;
use crate::error::CoreError;
use crate::message::{
    AgentStatus, GetAgentRef, GetAgentStatus, ListAgents, LookupAgent, LookupAgentById,
    ManuallyAdd, RegisterAgent, Synchronize, UnregisterAgent,
};
use crate::model::{Agent, AgentId};
use crate::traits::{AgentClientFactory, AgentDirectory};

/// Arguments for spawning an `AgentRegistryActor`
pub struct AgentRegistryActorArgs {
    /// Factory for per-agent transports
    pub client_factory: Arc<dyn AgentClientFactory>,
    /// Inventory event sender
    pub event_tx: broadcast::Sender<InventoryEvent>,
    /// Upper bound on each agent call
    pub sync_timeout: Duration,
}

struct RegisteredAgent {
    agent: Agent,
    actor: ActorRef<AgentActor>,
}

/// Registry of agents and their actors
pub struct AgentRegistryActor {
    agents: HashMap<String, RegisteredAgent>,
    names: HashMap<AgentId, String>,
    next_id: AgentId,
    client_factory: Arc<dyn AgentClientFactory>,
    event_tx: broadcast::Sender<InventoryEvent>,
    sync_timeout: Duration,
}

impl AgentRegistryActor {
    /// Get number of registered agents
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn by_id(&self, id: AgentId) -> Result<&RegisteredAgent, CoreError> {
        self.names
            .get(&id)
            .and_then(|name| self.agents.get(name))
            .ok_or_else(|| CoreError::AgentNotFound(id.to_string()))
    }
}

impl Actor for AgentRegistryActor {
    type Args = AgentRegistryActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), "AgentRegistryActor starting");

        Ok(Self {
            agents: HashMap::new(),
            names: HashMap::new(),
            next_id: 1,
            client_factory: args.client_factory,
            event_tx: args.event_tx,
            sync_timeout: args.sync_timeout,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "AgentRegistryActor stopping");

        for (name, registered) in &self.agents {
            info!(agent = %name, "stopping AgentActor");
            registered.actor.stop_gracefully().await.ok();
        }

        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<RegisterAgent> for AgentRegistryActor {
    type Reply = Result<Agent, CoreError>;

    async fn handle(
        &mut self,
        msg: RegisterAgent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let name = msg.config.name;
        if name.is_empty() {
            return Err(CoreError::ConfigError("agent name must not be empty".to_string()));
        }
        if self.agents.contains_key(&name) {
            return Err(CoreError::AgentAlreadyExists(name));
        }

        let agent = Agent {
            id: self.next_id,
            name: name.clone(),
            address: msg.config.address,
        };
        self.next_id += 1;

        let client = self.client_factory.create_client(&agent).await;
        let actor = AgentActor::spawn(AgentActorArgs {
            agent: agent.clone(),
            client,
            timeout: self.sync_timeout,
        });

        info!(agent = %name, agent_id = agent.id, address = %agent.address, "registered agent");
        let _ = self.event_tx.send(InventoryEvent::AgentRegistered { agent: name.clone() });

        self.names.insert(agent.id, name.clone());
        self.agents.insert(
            name,
            RegisteredAgent {
                agent: agent.clone(),
                actor,
            },
        );

        Ok(agent)
    }
}

impl Message<UnregisterAgent> for AgentRegistryActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: UnregisterAgent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let registered = self
            .agents
            .remove(&msg.name)
            .ok_or_else(|| CoreError::AgentNotFound(msg.name.clone()))?;

        self.names.remove(&registered.agent.id);
        registered.actor.stop_gracefully().await.ok();
        info!(agent = %msg.name, "unregistered agent");
        Ok(())
    }
}

impl Message<LookupAgent> for AgentRegistryActor {
    type Reply = Result<Agent, CoreError>;

    async fn handle(
        &mut self,
        msg: LookupAgent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.agents
            .get(&msg.name)
            .map(|registered| registered.agent.clone())
            .ok_or(CoreError::AgentNotFound(msg.name))
    }
}

impl Message<LookupAgentById> for AgentRegistryActor {
    type Reply = Result<Agent, CoreError>;

    async fn handle(
        &mut self,
        msg: LookupAgentById,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.by_id(msg.id).map(|registered| registered.agent.clone())
    }
}

impl Message<GetAgentRef> for AgentRegistryActor {
    type Reply = Result<ActorRef<AgentActor>, CoreError>;

    async fn handle(
        &mut self,
        msg: GetAgentRef,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.by_id(msg.id).map(|registered| registered.actor.clone())
    }
}

impl Message<ListAgents> for AgentRegistryActor {
    type Reply = Vec<AgentStatus>;

    async fn handle(
        &mut self,
        _msg: ListAgents,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let mut statuses = Vec::with_capacity(self.agents.len());

        for (name, registered) in &self.agents {
            match registered.actor.ask(GetAgentStatus).await {
                Ok(status) => statuses.push(status),
                Err(e) => {
                    warn!(agent = %name, error = %e, "failed to get agent status");
                }
            }
        }

        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

// ============================================================================
// Directory handle
// ============================================================================

/// Cloneable handle to the registry actor
#[derive(Clone)]
pub struct AgentRegistry {
    actor: ActorRef<AgentRegistryActor>,
}

fn flatten<M>(err: SendError<M, CoreError>) -> CoreError {
    match err {
        SendError::HandlerError(e) => e,
        other => CoreError::ActorError(other.to_string()),
    }
}

fn not_found_as_none(result: Result<Agent, CoreError>) -> Result<Option<Agent>, CoreError> {
    match result {
        Ok(agent) => Ok(Some(agent)),
        Err(CoreError::AgentNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

impl AgentRegistry {
    /// Spawn the registry actor
    pub fn spawn(args: AgentRegistryActorArgs) -> Self {
        Self {
            actor: AgentRegistryActor::spawn(args),
        }
    }

    #[must_use]
    pub fn actor_ref(&self) -> &ActorRef<AgentRegistryActor> {
        &self.actor
    }

    pub async fn register(&self, config: AgentConfig) -> Result<Agent, CoreError> {
        self.actor.ask(RegisterAgent { config }).await.map_err(flatten)
    }

    pub async fn unregister(&self, name: &str) -> Result<(), CoreError> {
        self.actor
            .ask(UnregisterAgent {
                name: name.to_string(),
            })
            .await
            .map_err(flatten)
    }

    pub async fn list(&self) -> Result<Vec<AgentStatus>, CoreError> {
        self.actor
            .ask(ListAgents)
            .await
            .map_err(|e| CoreError::ActorError(e.to_string()))
    }

    async fn agent_actor(&self, id: AgentId) -> Result<ActorRef<AgentActor>, CoreError> {
        self.actor.ask(GetAgentRef { id }).await.map_err(flatten)
    }

    pub async fn shutdown(&self) {
        self.actor.stop_gracefully().await.ok();
    }
}

#[async_trait]
impl AgentDirectory for AgentRegistry {
    async fn find_by_name(&self, name: &str) -> Result<Option<Agent>, CoreError> {
        let result = self
            .actor
            .ask(LookupAgent {
                name: name.to_string(),
            })
            .await
            .map_err(flatten);
        not_found_as_none(result)
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, CoreError> {
        let result = self.actor.ask(LookupAgentById { id }).await.map_err(flatten);
        not_found_as_none(result)
    }

    async fn synchronize_inventory(
        &self,
        agent: AgentId,
        resource_id: ResourceId,
        sync: SyncSet,
    ) -> Result<(), CoreError> {
        let actor = self.agent_actor(agent).await?;
        actor
            .ask(Synchronize { resource_id, sync })
            .await
            .map_err(flatten)
    }

    async fn manually_add_resource(
        &self,
        agent: AgentId,
        resource_type: ResourceTypeRef,
        parent_id: ResourceId,
        plugin_configuration: serde_json::Value,
        creator: String,
    ) -> Result<MergeResourceResponse, CoreError> {
        let actor = self.agent_actor(agent).await?;
        actor
            .ask(ManuallyAdd {
                resource_type,
                parent_id,
                plugin_configuration,
                creator,
            })
            .await
            .map_err(flatten)
    }
}
